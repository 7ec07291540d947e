use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::othello::Architecture;

use super::{Augmentation, Evaluator, FitConfig, Result, SelfPlayEngine, TrainError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Continue from `checkpoint_path` instead of a fresh predictor.
    pub resume: bool,
    pub checkpoint_path: PathBuf,
    pub export_path: PathBuf,
    pub data_dir: PathBuf,
    pub curve_path: PathBuf,
    pub selfplay_program: PathBuf,
    pub evaluator_program: PathBuf,
    pub num_simulation: usize,
    pub num_worker: usize,
    pub num_iter: usize,
    pub augment: bool,
    pub architecture: Architecture,
    /// Evaluate after every `eval_every`-th round.
    pub eval_every: usize,
    pub eval_games: usize,
    pub val_fraction: f64,
    pub seed: u64,
    pub fit: FitConfig,
    pub timeout: Option<Duration>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            resume: false,
            checkpoint_path: PathBuf::from("models/latest.ckpt"),
            export_path: PathBuf::from("models/model.pt"),
            data_dir: PathBuf::from("data"),
            curve_path: PathBuf::from("models/result.png"),
            selfplay_program: PathBuf::from("../target/release/selfplay"),
            evaluator_program: PathBuf::from("../target/release/vs_random"),
            num_simulation: 500,
            num_worker: 1,
            num_iter: 100,
            augment: true,
            architecture: Architecture::Simple,
            eval_every: 3,
            eval_games: 50,
            val_fraction: 0.2,
            seed: 42,
            fit: FitConfig::default(),
            timeout: None,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TrainError::InvalidConfig(msg));
        if !(self.val_fraction > 0.0 && self.val_fraction < 1.0) {
            return invalid(format!(
                "validation fraction must lie strictly between 0 and 1, got {}",
                self.val_fraction
            ));
        }
        for (name, value) in [
            ("batch size", self.fit.batch_size),
            ("max epochs", self.fit.max_epochs),
            ("worker count", self.num_worker),
            ("simulation budget", self.num_simulation),
            ("evaluation period", self.eval_every),
            ("evaluation game count", self.eval_games),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be positive"));
            }
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return invalid("timeout must be positive".to_string());
        }
        if self.resume && !self.checkpoint_path.is_file() {
            return invalid(format!(
                "cannot resume: checkpoint {} does not exist",
                self.checkpoint_path.display()
            ));
        }
        Ok(())
    }

    pub fn augmentation(&self) -> Augmentation {
        Augmentation::from(self.augment)
    }

    /// With a period of 3 this picks rounds 2, 5, 8, ...
    pub fn should_evaluate(&self, round: usize) -> bool {
        (round + 1) % self.eval_every == 0
    }

    pub fn engine(&self) -> SelfPlayEngine {
        SelfPlayEngine {
            program: self.selfplay_program.clone(),
            workers: self.num_worker,
            simulations: self.num_simulation,
            timeout: self.timeout,
        }
    }

    pub fn evaluator(&self) -> Evaluator {
        Evaluator {
            program: self.evaluator_program.clone(),
            games: self.eval_games,
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        TrainerConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cases: Vec<Box<dyn Fn(&mut TrainerConfig)>> = vec![
            Box::new(|c| c.val_fraction = 0.0),
            Box::new(|c| c.val_fraction = 1.0),
            Box::new(|c| c.val_fraction = -3.0),
            Box::new(|c| c.fit.batch_size = 0),
            Box::new(|c| c.fit.max_epochs = 0),
            Box::new(|c| c.num_worker = 0),
            Box::new(|c| c.num_simulation = 0),
            Box::new(|c| c.eval_every = 0),
            Box::new(|c| c.timeout = Some(Duration::ZERO)),
        ];
        for tweak in cases {
            let mut config = TrainerConfig::default();
            tweak(&mut config);
            assert!(matches!(
                config.validate(),
                Err(TrainError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn resume_requires_existing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TrainerConfig {
            resume: true,
            checkpoint_path: dir.path().join("latest.ckpt"),
            ..TrainerConfig::default()
        };
        assert!(config.validate().is_err());

        std::fs::write(&config.checkpoint_path, b"weights").unwrap();
        config.validate().unwrap();
        config.resume = false;
        config.validate().unwrap();
    }

    #[test]
    fn evaluation_period() {
        let config = TrainerConfig::default();
        let evaluated: Vec<usize> = (0..10).filter(|&r| config.should_evaluate(r)).collect();
        assert_eq!(evaluated, vec![2, 5, 8]);

        let every = TrainerConfig {
            eval_every: 1,
            ..TrainerConfig::default()
        };
        assert!((0..5).all(|r| every.should_evaluate(r)));
    }

    #[test]
    fn builds_engine_and_evaluator() {
        let config = TrainerConfig {
            num_worker: 6,
            num_simulation: 200,
            ..TrainerConfig::default()
        };
        assert_eq!(config.engine().workers, 6);
        assert_eq!(config.engine().simulations, 200);
        assert_eq!(config.evaluator().games, 50);
        assert_eq!(config.augmentation().multiplier(), 8);
    }
}
