use std::path::{Path, PathBuf};

use clap::Parser;

use crate::error::{Error, Result};
use crate::optim::OptimizerKind;
use crate::train::TrainConfig;

/// Command line and environment settings. Every flag can also come from the
/// environment variable named next to it.
#[derive(Parser, Debug, Clone)]
#[command(name = "ferrite-llie", about = "Train a low-light image enhancer on paired images")]
pub struct Cli {
    /// Dataset root holding `train/{low,high}` and `test/{low,high}`.
    #[arg(long, env = "DATASET_DIR_ROOT")]
    pub dataset_root: Option<PathBuf>,
    /// Output root; runs are written to `<save-root>/<model-name>/`.
    #[arg(long, env = "SAVE_DIR_ROOT")]
    pub save_root: Option<PathBuf>,
    #[arg(long, env = "MODEL_NAME", default_value = "PatchEnhancer")]
    pub model_name: String,
    /// Images are resized to a square of this side.
    #[arg(long, env = "INPUT_SIZE", default_value_t = 128)]
    pub input_size: u32,
    #[arg(long, env = "BATCH_SIZE", default_value_t = 32)]
    pub batch_size: usize,
    #[arg(long, env = "EPOCHS", default_value_t = 200)]
    pub epochs: usize,
    #[arg(long, env = "LEARNING_RATE", default_value_t = 1e-3)]
    pub learning_rate: f64,
    /// `adam` or `sgd`.
    #[arg(long, env = "OPTIMIZER", default_value = "adam")]
    pub optimizer: String,
    /// Batches decoded ahead on a loader thread; 0 decodes inline.
    #[arg(long, env = "NUM_WORKERS", default_value_t = 1)]
    pub num_workers: usize,
    /// JSON weights for the perceptual feature extractor. The built-in edge
    /// filter bank is used when absent.
    #[arg(long, env = "FEATURE_WEIGHTS")]
    pub feature_weights: Option<PathBuf>,
    /// Continue from `<run dir>/checkpoints/best.json` if it exists.
    #[arg(long, env = "RESUME")]
    pub resume: bool,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub dataset_root: PathBuf,
    pub save_root: PathBuf,
    pub feature_weights: Option<PathBuf>,
    pub resume: bool,
    pub train: TrainConfig,
}

impl RunConfig {
    pub fn new(dataset_root: impl Into<PathBuf>, save_root: impl Into<PathBuf>, train: TrainConfig) -> Self {
        RunConfig {
            dataset_root: dataset_root.into(),
            save_root: save_root.into(),
            feature_weights: None,
            resume: false,
            train,
        }
    }

    /// `<save_root>/<model_name>`.
    pub fn run_dir(&self) -> PathBuf {
        self.save_root.join(&self.train.model_name)
    }
}

fn required(value: Option<PathBuf>, var: &str) -> Result<PathBuf> {
    value.ok_or_else(|| Error::Config(format!("{var} is not set")))
}

fn existing_dir(path: &Path, var: &str) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(Error::Config(format!("{var}=`{}` is not a directory", path.display())))
    }
}

impl TryFrom<Cli> for RunConfig {
    type Error = Error;

    fn try_from(cli: Cli) -> Result<RunConfig> {
        let dataset_root = required(cli.dataset_root, "DATASET_DIR_ROOT")?;
        let save_root = required(cli.save_root, "SAVE_DIR_ROOT")?;
        existing_dir(&dataset_root, "DATASET_DIR_ROOT")?;

        let train = TrainConfig {
            model_name: cli.model_name,
            epochs: cli.epochs,
            batch_size: cli.batch_size,
            input_size: cli.input_size,
            learning_rate: cli.learning_rate,
            optimizer: cli.optimizer.parse::<OptimizerKind>()?,
            num_workers: cli.num_workers,
            ..TrainConfig::default()
        };
        train.validate()?;

        Ok(RunConfig {
            dataset_root,
            save_root,
            feature_weights: cli.feature_weights,
            resume: cli.resume,
            train,
        })
    }
}
