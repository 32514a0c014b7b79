pub mod epoch_stats;
pub mod loop_fn;
pub mod policy;
pub mod runner;
pub mod train_config;

pub use epoch_stats::{EpochReport, EpochStats, TrainHistory};
pub use loop_fn::{format_elapsed, train_loop, Phase, Trainer};
pub use policy::{BestRecord, CheckpointPolicy, Decision};
pub use runner::{EpochRunner, Mode, ValidationPass};
pub use train_config::{TrainConfig, SAMPLE_INTERVAL, SEED};
