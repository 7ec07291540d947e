use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use log::{debug, error};

use super::{Result, TrainError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// `None` when the process was ended by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an external program to completion.
#[allow(async_fn_in_trait)]
pub trait ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput>;
}

/// Spawns real child processes, capturing their output.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        let child = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TrainError::io(&invocation.program, e))?;

        // dropping the wait future on timeout kills the child
        let waiting = child.wait_with_output();
        let output = match invocation.timeout {
            Some(after) => tokio::time::timeout(after, waiting).await.map_err(|_| {
                TrainError::Timeout {
                    program: invocation.program_name(),
                    after,
                }
            })?,
            None => waiting.await,
        }
        .map_err(|e| TrainError::io(&invocation.program, e))?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// The external self-play generator: `<program> <dir> <workers> <simulations>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfPlayEngine {
    pub program: PathBuf,
    pub workers: usize,
    pub simulations: usize,
    pub timeout: Option<Duration>,
}

impl SelfPlayEngine {
    pub fn invocation(&self, out_dir: &Path) -> Invocation {
        Invocation {
            program: self.program.clone(),
            args: vec![
                out_dir.display().to_string(),
                self.workers.to_string(),
                self.simulations.to_string(),
            ],
            timeout: self.timeout,
        }
    }

    /// Fills `out_dir` with one round of samples.
    pub async fn generate<R: ProcessRunner>(&self, runner: &R, out_dir: &Path) -> Result<()> {
        let invocation = self.invocation(out_dir);
        debug!("Running {:?}", invocation);
        let output = runner.run(&invocation).await?;
        log_lines(&invocation, &output.stdout);
        if !output.success() {
            error!("{} failed:\n{}", invocation.program_name(), output.stderr);
            return Err(TrainError::EngineFailure {
                code: output.code,
                stderr: output.stderr,
            });
        }
        Ok(())
    }
}

/// Plays the model against the fixed baseline: `<program> <games> <model>`.
/// Prints the win rate as the last line of stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluator {
    pub program: PathBuf,
    pub games: usize,
    pub timeout: Option<Duration>,
}

impl Evaluator {
    pub fn invocation(&self, model: &Path) -> Invocation {
        Invocation {
            program: self.program.clone(),
            args: vec![self.games.to_string(), model.display().to_string()],
            timeout: self.timeout,
        }
    }

    pub async fn evaluate<R: ProcessRunner>(&self, runner: &R, model: &Path) -> Result<f32> {
        let invocation = self.invocation(model);
        debug!("Running {:?}", invocation);
        let output = runner.run(&invocation).await?;
        if !output.success() {
            error!("{} failed:\n{}", invocation.program_name(), output.stderr);
            return Err(TrainError::EvaluatorFailure {
                code: output.code,
                detail: output.stderr,
            });
        }
        parse_win_rate(&output.stdout).ok_or_else(|| TrainError::EvaluatorFailure {
            code: output.code,
            detail: format!("expected a win rate on stdout, got {:?}", output.stdout),
        })
    }
}

fn parse_win_rate(stdout: &str) -> Option<f32> {
    let rate: f32 = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())?
        .parse()
        .ok()?;
    (0.0..=1.0).contains(&rate).then_some(rate)
}

fn log_lines(invocation: &Invocation, stdout: &str) {
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        debug!("[{}] {line}", invocation.program_name());
    }
}
