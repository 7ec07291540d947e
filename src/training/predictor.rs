use std::path::Path;

use log::{debug, warn};
use ndarray::{Array1, ArrayView3};
use serde::{Deserialize, Serialize};

use super::{batches, plan_batches, Batch, BatchConfig, Result, SampleSet, Split, TrainError};

/// The trainable policy/value model, seen from the training loop.
pub trait Predictor {
    /// One optimisation step; returns the batch loss.
    fn train_step(&mut self, batch: &Batch) -> anyhow::Result<f32>;

    /// Loss on a batch without updating weights.
    fn eval_step(&mut self, batch: &Batch) -> anyhow::Result<f32>;

    /// Move probabilities and value for one `PLANES x 8 x 8` position.
    fn predict(&self, state: ArrayView3<f32>) -> anyhow::Result<(Array1<f32>, f32)>;

    fn save_checkpoint(&self, path: &Path) -> anyhow::Result<()>;

    /// Writes the inference graph read by the self-play engine.
    fn export(&self, path: &Path) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub batch_size: usize,
    pub max_epochs: usize,
    pub patience: usize,
    pub min_delta: f32,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_epochs: 20,
            patience: 3,
            min_delta: 0.0,
        }
    }
}

/// Stops once validation loss fails to improve by `min_delta` for `patience` epochs,
/// or at once on a NaN or infinite loss.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f32,
    best: Option<f32>,
    stale_epochs: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience,
            min_delta,
            best: None,
            stale_epochs: 0,
        }
    }

    /// Records an epoch's validation loss; `Some` when training should stop.
    /// A non-finite loss never becomes the best.
    pub fn update(&mut self, loss: f32) -> Option<StopReason> {
        if !loss.is_finite() {
            return Some(StopReason::NonFinite);
        }
        match self.best {
            Some(best) if loss >= best - self.min_delta => self.stale_epochs += 1,
            _ => {
                self.best = Some(loss);
                self.stale_epochs = 0;
            }
        }
        (self.stale_epochs >= self.patience).then_some(StopReason::EarlyStopping)
    }

    pub fn best(&self) -> Option<f32> {
        self.best
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    EarlyStopping,
    MaxEpochs,
    /// Validation loss became NaN or infinite.
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLoss {
    pub train: f32,
    pub val: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub epochs: Vec<EpochLoss>,
    /// `None` when no epoch produced a finite validation loss.
    pub best_val_loss: Option<f32>,
    pub stop: StopReason,
}

/// Trains until early stopping triggers or `max_epochs` is reached, whichever
/// comes first.
pub fn fit<P: Predictor>(
    predictor: &mut P,
    samples: &SampleSet,
    split: &Split,
    config: &FitConfig,
    seed: u64,
) -> Result<FitReport> {
    if config.batch_size == 0 || config.max_epochs == 0 {
        return Err(TrainError::InvalidConfig(
            "batch size and epoch limit must be positive".to_string(),
        ));
    }
    if split.train.len() < config.batch_size {
        return Err(TrainError::InvalidConfig(format!(
            "{} training samples do not fill one batch of {}",
            split.train.len(),
            config.batch_size
        )));
    }

    let val_plan = plan_batches(&split.val, BatchConfig::validation(config.batch_size), seed)?;
    let mut stopper = EarlyStopping::new(config.patience, config.min_delta);
    let mut epochs = Vec::with_capacity(config.max_epochs);
    let mut stop = StopReason::MaxEpochs;

    for epoch in 0..config.max_epochs {
        let train_plan = plan_batches(
            &split.train,
            BatchConfig::training(config.batch_size),
            seed.wrapping_add(epoch as u64),
        )?;
        let mut train_loss = 0.0;
        for batch in batches(samples, &train_plan) {
            train_loss += predictor.train_step(&batch)?;
        }
        train_loss /= train_plan.len() as f32;

        let mut val_loss = 0.0;
        for batch in batches(samples, &val_plan) {
            val_loss += predictor.eval_step(&batch)? * batch.len() as f32;
        }
        val_loss /= split.val.len() as f32;

        debug!("epoch {epoch}: train loss {train_loss:.5}, val loss {val_loss:.5}");
        epochs.push(EpochLoss {
            train: train_loss,
            val: val_loss,
        });
        if let Some(reason) = stopper.update(val_loss) {
            if reason == StopReason::NonFinite {
                warn!("Validation loss is {val_loss} after epoch {epoch}, stopping");
            }
            stop = reason;
            break;
        }
    }

    Ok(FitReport {
        epochs,
        best_val_loss: stopper.best(),
        stop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::testing::{synthetic_samples, ScriptedPredictor};
    use crate::training::split;

    #[test]
    fn early_stopping_counts_stale_epochs() {
        let mut stopper = EarlyStopping::new(3, 0.0);
        assert_eq!(stopper.update(1.0), None);
        assert_eq!(stopper.update(0.9), None);
        assert_eq!(stopper.update(0.95), None);
        assert_eq!(stopper.update(0.9), None);
        assert_eq!(stopper.update(0.91), Some(StopReason::EarlyStopping));
        assert_eq!(stopper.best(), Some(0.9));
    }

    #[test]
    fn early_stopping_respects_min_delta() {
        let mut stopper = EarlyStopping::new(1, 0.1);
        assert_eq!(stopper.update(1.0), None);
        assert_eq!(stopper.update(0.95), Some(StopReason::EarlyStopping));
    }

    #[test]
    fn non_finite_loss_stops_and_keeps_best() {
        let mut stopper = EarlyStopping::new(3, 0.0);
        assert_eq!(stopper.update(1.0), None);
        assert_eq!(stopper.update(f32::NAN), Some(StopReason::NonFinite));
        assert_eq!(stopper.best(), Some(1.0));
        assert_eq!(stopper.update(f32::INFINITY), Some(StopReason::NonFinite));
        assert_eq!(stopper.best(), Some(1.0));
        // a worse loss after the NaN is still no improvement
        assert_eq!(stopper.update(2.0), None);
        assert_eq!(stopper.best(), Some(1.0));
    }

    #[test]
    fn stops_early_when_validation_plateaus() {
        let samples = synthetic_samples(100, 1);
        let split = split(100, 0.2, 42).unwrap();
        let mut predictor = ScriptedPredictor::with_val_losses(vec![1.0, 0.5, 0.6, 0.7, 0.8, 0.1]);

        let report = fit(&mut predictor, &samples, &split, &FitConfig::default(), 0).unwrap();
        assert_eq!(report.stop, StopReason::EarlyStopping);
        assert_eq!(report.epochs.len(), 5);
        assert_eq!(report.best_val_loss, Some(0.5));
    }

    #[test]
    fn max_epochs_bounds_an_improving_run() {
        let samples = synthetic_samples(100, 1);
        let split = split(100, 0.2, 42).unwrap();
        let mut predictor = ScriptedPredictor::with_val_losses((0..50).map(|i| 1.0 / (i + 1) as f32).collect());
        let config = FitConfig {
            batch_size: 16,
            max_epochs: 4,
            ..FitConfig::default()
        };

        let report = fit(&mut predictor, &samples, &split, &config, 0).unwrap();
        assert_eq!(report.stop, StopReason::MaxEpochs);
        assert_eq!(report.epochs.len(), 4);
        // 80 training rows, 5 full batches of 16 per epoch
        assert_eq!(predictor.train_steps, 20);
        // 20 validation rows: 16 + 4
        assert_eq!(predictor.eval_rows, 4 * 20);
    }

    #[test]
    fn nan_validation_loss_ends_fitting() {
        let samples = synthetic_samples(100, 1);
        let split = split(100, 0.2, 42).unwrap();
        let mut predictor = ScriptedPredictor::with_val_losses(vec![1.0, f32::NAN, 0.5, 0.4]);

        let report = fit(&mut predictor, &samples, &split, &FitConfig::default(), 0).unwrap();
        assert_eq!(report.stop, StopReason::NonFinite);
        assert_eq!(report.epochs.len(), 2);
        assert!(report.epochs[1].val.is_nan());
        assert_eq!(report.best_val_loss, Some(1.0));
    }

    #[test]
    fn nan_first_epoch_has_no_best() {
        let samples = synthetic_samples(100, 1);
        let split = split(100, 0.2, 42).unwrap();
        let mut predictor = ScriptedPredictor::with_val_losses(vec![f32::NAN]);

        let report = fit(&mut predictor, &samples, &split, &FitConfig::default(), 0).unwrap();
        assert_eq!(report.stop, StopReason::NonFinite);
        assert_eq!(report.epochs.len(), 1);
        assert_eq!(report.best_val_loss, None);
    }

    #[test]
    fn rejects_batch_larger_than_training_set() {
        let samples = synthetic_samples(10, 1);
        let split = split(10, 0.2, 42).unwrap();
        let mut predictor = ScriptedPredictor::default();
        let res = fit(&mut predictor, &samples, &split, &FitConfig::default(), 0);
        assert!(matches!(res, Err(TrainError::InvalidConfig(_))));
    }
}
