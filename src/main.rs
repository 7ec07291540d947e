use std::{path::PathBuf, thread, time::Duration};

use clap::Parser;
use log::{info, warn};
use othello_zero::{
    othello::{Architecture, TchPredictor},
    training::{FitConfig, Orchestrator, TokioProcessRunner, TrainerConfig},
};
use tch::Device;

/// Self-play reinforcement training loop for an 8x8 Othello policy/value network.
#[derive(Parser, Debug)]
#[command(name = "zero-train", version, about, long_about = None)]
struct Args {
    /// Continue from the checkpoint instead of starting from scratch
    #[arg(long)]
    resume: bool,

    #[arg(long, default_value = "models/latest.ckpt")]
    checkpoint: PathBuf,

    /// Inference graph handed to the self-play engine
    #[arg(long, default_value = "models/model.pt")]
    export: PathBuf,

    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Win-rate plot; raw points go next to it as JSON
    #[arg(long, default_value = "models/result.png")]
    curve: PathBuf,

    #[arg(long, default_value_t = 500)]
    num_simulation: usize,

    /// Number of training rounds
    #[arg(long, default_value_t = 100)]
    num_iter: usize,

    /// Self-play workers; defaults to the number of CPUs
    #[arg(long)]
    num_worker: Option<usize>,

    /// Train on the raw positions only, skipping the 8 board symmetries
    #[arg(long)]
    no_augment: bool,

    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    #[arg(long, value_enum, default_value_t = Architecture::Simple)]
    model: Architecture,

    /// Evaluate against the baseline after every N-th round
    #[arg(long, default_value_t = 3)]
    eval_every: usize,

    #[arg(long, default_value_t = 50)]
    eval_games: usize,

    #[arg(long, default_value_t = 0.2)]
    val_fraction: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 20)]
    max_epochs: usize,

    /// Epochs without validation improvement before fitting stops
    #[arg(long, default_value_t = 3)]
    patience: usize,

    #[arg(long, default_value = "../target/release/selfplay")]
    selfplay_bin: PathBuf,

    #[arg(long, default_value = "../target/release/vs_random")]
    evaluator_bin: PathBuf,

    /// Kill a subprocess that runs longer than this
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Train on the CPU even when CUDA is available
    #[arg(long)]
    cpu: bool,
}

impl Args {
    fn into_config(self) -> TrainerConfig {
        let num_worker = self
            .num_worker
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()));
        TrainerConfig {
            resume: self.resume,
            checkpoint_path: self.checkpoint,
            export_path: self.export,
            data_dir: self.data_dir,
            curve_path: self.curve,
            selfplay_program: self.selfplay_bin,
            evaluator_program: self.evaluator_bin,
            num_simulation: self.num_simulation,
            num_worker,
            num_iter: self.num_iter,
            augment: !self.no_augment,
            architecture: self.model,
            eval_every: self.eval_every,
            eval_games: self.eval_games,
            val_fraction: self.val_fraction,
            seed: self.seed,
            fit: FitConfig {
                batch_size: self.batch_size,
                max_epochs: self.max_epochs,
                patience: self.patience,
                ..FitConfig::default()
            },
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let device = if args.cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available()
    };
    let config = args.into_config();
    config.validate()?;
    info!("Training on {device:?} with {config:?}");

    let predictor = if config.resume {
        let predictor = TchPredictor::load(&config.checkpoint_path, device)?;
        if predictor.meta().architecture != config.architecture {
            warn!(
                "Checkpoint holds a {} network, ignoring --model {}",
                predictor.meta().architecture,
                config.architecture
            );
        }
        predictor
    } else {
        TchPredictor::new(config.architecture, device)?
    };

    let mut orchestrator = Orchestrator::new(config, predictor, TokioProcessRunner)?;
    let summary = orchestrator.run().await?;

    info!("Finished {} rounds", summary.rounds.len());
    if let Some(last) = summary.curve.latest() {
        info!("Last win rate {:.3} at round {}", last.win_rate, last.round);
    }
    Ok(())
}
