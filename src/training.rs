mod augment;
mod checkpoint;
mod config;
mod error;
mod orchestrator;
mod predictor;
mod process;
mod progress;
mod sample_store;
mod split;
#[cfg(test)]
mod testing;
mod timer;

pub use augment::*;
pub use checkpoint::*;
pub use config::*;
pub use error::*;
pub use orchestrator::*;
pub use predictor::*;
pub use process::*;
pub use progress::*;
pub use sample_store::*;
pub use split::*;
pub use timer::*;
