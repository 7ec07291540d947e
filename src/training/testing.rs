//! Scripted stand-ins for the external processes and the predictor.

use std::{fs, path::Path, sync::Mutex};

use anyhow::bail;
use ndarray::{Array1, Array2, Array3, Array4, ArrayView3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::othello::{BOARD_SIZE, MOVE_COUNT, PLANES};

use super::{
    write_round, Batch, Invocation, ProcessOutput, ProcessRunner, Result, SampleSet, VALUES_FILE,
};

/// Random but reproducible samples with valid policies and outcomes.
pub fn synthetic_samples(n: usize, seed: u64) -> SampleSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut states = Array4::zeros((n, PLANES, BOARD_SIZE, BOARD_SIZE));
    let mut policies = Array2::zeros((n, MOVE_COUNT));
    let mut values = Array1::zeros(n);
    for i in 0..n {
        let mut board = Array3::<f32>::zeros((PLANES, BOARD_SIZE, BOARD_SIZE));
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                match rng.gen_range(0..3) {
                    0 => board[[0, row, col]] = 1.0,
                    1 => board[[1, row, col]] = 1.0,
                    _ => {}
                }
            }
        }
        states.index_axis_mut(ndarray::Axis(0), i).assign(&board);

        let weights: Vec<f32> = (0..MOVE_COUNT).map(|_| rng.gen::<f32>()).collect();
        let total: f32 = weights.iter().sum();
        for (m, w) in weights.into_iter().enumerate() {
            policies[[i, m]] = w / total;
        }
        values[i] = [-1.0, 0.0, 1.0][rng.gen_range(0..3)];
    }
    SampleSet::new(states, policies, values).unwrap()
}

/// Answers `selfplay` invocations by writing a synthetic round into the
/// requested directory and every other program as the baseline evaluator.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    samples: usize,
    engine_exit: i32,
    evaluator_exit: i32,
    evaluator_stdout: Option<String>,
    win_rates: Vec<f32>,
    write_values: bool,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new(samples: usize) -> Self {
        Self {
            samples,
            write_values: true,
            ..Self::default()
        }
    }

    pub fn with_engine_exit(mut self, code: i32) -> Self {
        self.engine_exit = code;
        self
    }

    pub fn with_evaluator_exit(mut self, code: i32) -> Self {
        self.evaluator_exit = code;
        self
    }

    pub fn with_evaluator_stdout(mut self, stdout: &str) -> Self {
        self.evaluator_stdout = Some(stdout.to_string());
        self
    }

    pub fn with_win_rates(mut self, rates: Vec<f32>) -> Self {
        self.win_rates = rates;
        self
    }

    pub fn without_values(mut self) -> Self {
        self.write_values = false;
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    fn self_play(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        if self.engine_exit != 0 {
            return Ok(ProcessOutput {
                code: Some(self.engine_exit),
                stdout: String::new(),
                stderr: "selfplay: model not found".to_string(),
            });
        }
        let dir = Path::new(&invocation.args[0]);
        write_round(dir, &synthetic_samples(self.samples, 0))?;
        if !self.write_values {
            fs::remove_file(dir.join(VALUES_FILE)).unwrap();
        }
        Ok(ProcessOutput {
            code: Some(0),
            stdout: format!("Finished! number of data: {}\n", self.samples),
            stderr: String::new(),
        })
    }

    fn evaluate(&self, evaluations: usize) -> ProcessOutput {
        let stdout = self.evaluator_stdout.clone().unwrap_or_else(|| {
            let rate = match self.win_rates.len() {
                0 => 0.5,
                len => self.win_rates[evaluations % len],
            };
            format!("{rate}\n")
        });
        ProcessOutput {
            code: Some(self.evaluator_exit),
            stdout,
            stderr: String::new(),
        }
    }
}

impl ProcessRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        let evaluations = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(invocation.clone());
            calls
                .iter()
                .filter(|c| !c.program_name().contains("selfplay"))
                .count()
        };
        if invocation.program_name().contains("selfplay") {
            self.self_play(invocation)
        } else {
            Ok(self.evaluate(evaluations - 1))
        }
    }
}

/// Deterministic predictor whose checkpoint captures everything it was fed.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScriptedPredictor {
    /// Validation loss reported for each epoch; 1.0 once exhausted.
    pub val_losses: Vec<f32>,
    pub train_steps: usize,
    pub eval_steps: usize,
    pub eval_rows: usize,
    pub epochs: usize,
    /// Order-sensitive digest of every training batch.
    pub fingerprint: f64,
    #[serde(skip)]
    pub fail_export: bool,
    #[serde(skip)]
    trained_since_eval: bool,
}

impl ScriptedPredictor {
    pub fn with_val_losses(val_losses: Vec<f32>) -> Self {
        Self {
            val_losses,
            ..Self::default()
        }
    }

    /// Writes a partial file on export and then fails.
    pub fn failing_export() -> Self {
        Self {
            fail_export: true,
            ..Self::default()
        }
    }
}

impl super::Predictor for ScriptedPredictor {
    fn train_step(&mut self, batch: &Batch) -> anyhow::Result<f32> {
        self.trained_since_eval = true;
        self.train_steps += 1;
        for (i, (value, policy)) in batch
            .values()
            .iter()
            .zip(batch.policies().rows())
            .enumerate()
        {
            let weight = (i + 1) as f64;
            self.fingerprint = self.fingerprint * 0.999
                + weight * (*value as f64 + policy[i % MOVE_COUNT] as f64);
        }
        Ok(1.0 / self.train_steps as f32)
    }

    fn eval_step(&mut self, batch: &Batch) -> anyhow::Result<f32> {
        if self.trained_since_eval {
            self.trained_since_eval = false;
            self.epochs += 1;
        }
        self.eval_steps += 1;
        self.eval_rows += batch.len();
        Ok(self
            .epochs
            .checked_sub(1)
            .and_then(|epoch| self.val_losses.get(epoch))
            .copied()
            .unwrap_or(1.0))
    }

    fn predict(&self, _state: ArrayView3<f32>) -> anyhow::Result<(Array1<f32>, f32)> {
        Ok((
            Array1::from_elem(MOVE_COUNT, 1.0 / MOVE_COUNT as f32),
            (self.fingerprint as f32).tanh(),
        ))
    }

    fn save_checkpoint(&self, path: &Path) -> anyhow::Result<()> {
        fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }

    fn export(&self, path: &Path) -> anyhow::Result<()> {
        if self.fail_export {
            fs::write(path, b"partial")?;
            bail!("export interrupted");
        }
        fs::write(path, format!("export {}", self.fingerprint))?;
        Ok(())
    }
}
