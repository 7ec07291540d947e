use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Network variants the predictor can be built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// Four 3x3 convolutions and two dense layers.
    #[default]
    Simple,
    /// A small residual tower.
    Residual,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Simple => write!(f, "simple"),
            Architecture::Residual => write!(f, "residual"),
        }
    }
}
