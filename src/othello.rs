mod architecture;
mod board;
#[cfg(feature = "torch")]
mod l2_norm;
#[cfg(feature = "torch")]
mod nn;
#[cfg(feature = "torch")]
mod predictor;

pub use architecture::*;
pub use board::*;
#[cfg(feature = "torch")]
pub use l2_norm::*;
#[cfg(feature = "torch")]
pub use nn::*;
#[cfg(feature = "torch")]
pub use predictor::*;
