use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::loss::composer::PERCEPTUAL_WEIGHT;
use crate::model::EnhancerSpec;
use crate::optim::OptimizerKind;

/// Seed for weight initialization and per-epoch shuffling.
pub const SEED: u64 = 42;

/// Validation outputs are written to the sample store every this many epochs.
pub const SAMPLE_INTERVAL: usize = 20;

/// Hyperparameters of a training run.
///
/// Built once at start-up and only ever borrowed afterwards. A copy is stored
/// in every checkpoint so the model can be rebuilt with the right shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Tag used for output directories and file names.
    pub model_name: String,
    pub epochs: usize,
    pub batch_size: usize,
    /// Images are resized to `input_size x input_size`.
    pub input_size: u32,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    pub perceptual_weight: f64,
    pub sample_interval: usize,
    pub seed: u64,
    /// Batches prefetched ahead by the loader thread; 0 loads inline.
    pub num_workers: usize,
    pub enhancer: EnhancerSpec,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            model_name: "PatchEnhancer".into(),
            epochs: 200,
            batch_size: 32,
            input_size: 128,
            learning_rate: 1e-3,
            optimizer: OptimizerKind::Adam,
            perceptual_weight: PERCEPTUAL_WEIGHT,
            sample_interval: SAMPLE_INTERVAL,
            seed: SEED,
            num_workers: 1,
            enhancer: EnhancerSpec::default(),
        }
    }
}

impl TrainConfig {
    /// Defaults with the given epoch count and batch size.
    pub fn new(epochs: usize, batch_size: usize) -> Self {
        TrainConfig { epochs, batch_size, ..TrainConfig::default() }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("epochs", self.epochs),
            ("batch size", self.batch_size),
            ("input size", self.input_size as usize),
            ("sample interval", self.sample_interval),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(Error::Config(format!("{name} must be positive")));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::Config(format!("invalid learning rate {}", self.learning_rate)));
        }
        if self.model_name.is_empty() || self.model_name.contains(&['/', '\\'][..]) {
            return Err(Error::Config(format!("invalid model name `{}`", self.model_name)));
        }
        Ok(())
    }
}
