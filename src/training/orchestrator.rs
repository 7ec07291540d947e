use std::{fmt, time::Duration};

use log::{debug, info, warn};
use serde::Serialize;

use crate::othello::{move_to_cell, opening_position};

use super::{
    augment, export_predictor, fit, split, CheckpointSlot, Evaluator, FitReport, Predictor,
    ProcessRunner, ProgressCurve, Result, RunError, SampleDir, SelfPlayEngine, Timer,
    TrainerConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Generating,
    Loading,
    Augmenting,
    Splitting,
    Fitting,
    Checkpointing,
    Evaluating,
    Exporting,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Generating => "generating self-play samples",
            Phase::Loading => "loading samples",
            Phase::Augmenting => "augmenting samples",
            Phase::Splitting => "splitting samples",
            Phase::Fitting => "fitting the predictor",
            Phase::Checkpointing => "checkpointing",
            Phase::Evaluating => "evaluating against the baseline",
            Phase::Exporting => "exporting the predictor",
            Phase::Finished => "finished",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundReport {
    pub round: usize,
    pub raw_samples: usize,
    pub augmented_samples: usize,
    pub train_samples: usize,
    pub val_samples: usize,
    pub fit: FitReport,
    pub checkpoint_version: u64,
    pub win_rate: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub rounds: Vec<RoundReport>,
    pub curve: ProgressCurve,
}

/// Drives generate, load, augment, split, fit, checkpoint, evaluate and export,
/// one round at a time.
///
/// Every phase consumes the previous phase's output, so nothing overlaps. Any
/// failure aborts the whole run. Two orchestrators must never share a
/// checkpoint path; nothing enforces this.
pub struct Orchestrator<P, R> {
    config: TrainerConfig,
    predictor: P,
    runner: R,
    store: SampleDir,
    engine: SelfPlayEngine,
    evaluator: Evaluator,
    checkpoint: CheckpointSlot,
    curve: ProgressCurve,
    phase: Phase,
    timer: Timer,
}

impl<P: Predictor, R: ProcessRunner> Orchestrator<P, R> {
    /// `predictor` is either fresh or restored from `config.checkpoint_path`.
    pub fn new(config: TrainerConfig, predictor: P, runner: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: SampleDir::new(&config.data_dir),
            engine: config.engine(),
            evaluator: config.evaluator(),
            checkpoint: CheckpointSlot::new(&config.checkpoint_path),
            curve: ProgressCurve::new(),
            phase: Phase::Idle,
            timer: Timer::new(),
            config,
            predictor,
            runner,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn curve(&self) -> &ProgressCurve {
        &self.curve
    }

    pub fn predictor(&self) -> &P {
        &self.predictor
    }

    pub fn checkpoint(&self) -> &CheckpointSlot {
        &self.checkpoint
    }

    pub fn into_predictor(self) -> P {
        self.predictor
    }

    /// Runs `num_iter` rounds, numbered from zero even when resuming.
    pub async fn run(&mut self) -> Result<RunSummary, RunError> {
        let mut rounds = Vec::with_capacity(self.config.num_iter);
        for round in 0..self.config.num_iter {
            info!("********** round {round} **********");
            rounds.push(self.run_round(round).await?);
        }
        self.enter(Phase::Finished);
        Ok(RunSummary {
            rounds,
            curve: self.curve.clone(),
        })
    }

    pub async fn run_round(&mut self, round: usize) -> Result<RoundReport, RunError> {
        let round_timer = Timer::new();
        let report = self.round_phases(round).await.map_err(|source| RunError {
            round,
            phase: self.phase,
            source,
        })?;
        round_timer.log_if_greater(Duration::from_secs(1), &format!("Round {round} took {{t}}"));
        Ok(report)
    }

    async fn round_phases(&mut self, round: usize) -> Result<RoundReport> {
        self.enter(Phase::Generating);
        self.store.prepare()?;
        self.engine.generate(&self.runner, self.store.path()).await?;

        self.enter(Phase::Loading);
        let raw = self.store.load()?;
        let raw_samples = raw.len();

        self.enter(Phase::Augmenting);
        let samples = augment(&raw, self.config.augmentation())?;
        drop(raw);
        info!(
            "{raw_samples} self-play samples, {} after augmentation",
            samples.len()
        );

        self.enter(Phase::Splitting);
        let split = split(samples.len(), self.config.val_fraction, self.config.seed)?;

        self.enter(Phase::Fitting);
        let report = fit(
            &mut self.predictor,
            &samples,
            &split,
            &self.config.fit,
            self.config.seed.wrapping_add(round as u64),
        )?;
        match report.best_val_loss {
            Some(best) => info!(
                "Trained {} epochs ({:?}), best validation loss {best:.5}",
                report.epochs.len(),
                report.stop
            ),
            None => warn!(
                "Trained {} epochs ({:?}) without a finite validation loss",
                report.epochs.len(),
                report.stop
            ),
        }
        self.probe_opening()?;

        self.enter(Phase::Checkpointing);
        let checkpoint_version = self.checkpoint.commit(&self.predictor)?;

        let mut win_rate = None;
        if self.config.should_evaluate(round) {
            self.enter(Phase::Evaluating);
            let rate = self
                .evaluator
                .evaluate(&self.runner, self.checkpoint.path())
                .await?;
            info!("Win rate against baseline after round {round}: {rate:.3}");
            self.curve.record(round, rate);
            self.curve.save(&self.config.curve_path)?;
            win_rate = Some(rate);
        }

        self.enter(Phase::Exporting);
        export_predictor(&self.predictor, &self.config.export_path)?;

        Ok(RoundReport {
            round,
            raw_samples,
            augmented_samples: samples.len(),
            train_samples: split.train.len(),
            val_samples: split.val.len(),
            fit: report,
            checkpoint_version,
            win_rate,
        })
    }

    fn probe_opening(&self) -> Result<()> {
        let (policy, value) = self.predictor.predict(opening_position().view())?;
        let best = policy
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| move_to_cell(idx));
        info!("Opening position: value {value:+.3}, preferred move {best:?}");
        Ok(())
    }

    fn enter(&mut self, phase: Phase) {
        let passed = self.timer.restart();
        debug!("{} -> {} (after {passed:.1?})", self.phase, phase);
        self.phase = phase;
    }
}
