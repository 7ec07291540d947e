use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use super::Phase;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("corrupt round data in {}: {reason}", path.display())]
    CorruptRoundData { path: PathBuf, reason: String },

    #[error("shape mismatch: expected {expected}, got {actual:?}")]
    ShapeMismatch {
        expected: &'static str,
        actual: Vec<usize>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("self-play engine exited with {}: {stderr}", describe_code(*code))]
    EngineFailure { code: Option<i32>, stderr: String },

    #[error("evaluator failed ({}): {detail}", describe_code(*code))]
    EvaluatorFailure { code: Option<i32>, detail: String },

    #[error("{program} did not finish within {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("predictor error: {0:#}")]
    Predictor(#[from] anyhow::Error),
}

impl TrainError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TrainError::CorruptRoundData {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrainError::Io {
            path: path.into(),
            source,
        }
    }
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (killed by signal)".to_string(),
    }
}

/// A failure together with the round and phase it surfaced in.
#[derive(Debug, Error)]
#[error("round {round} failed while {phase}: {source}")]
pub struct RunError {
    pub round: usize,
    pub phase: Phase,
    #[source]
    pub source: TrainError,
}

pub type Result<T, E = TrainError> = std::result::Result<T, E>;
