pub mod activation;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod io;
pub mod layers;
pub mod loss;
pub mod math;
pub mod metrics;
pub mod model;
pub mod network;
pub mod optim;
pub mod train;

// Convenience re-exports
pub use config::{Cli, RunConfig};
pub use error::{Error, Result};
pub use math::{ImageTensor, Matrix};
pub use model::{Model, PatchEnhancer};
pub use network::Network;
pub use train::{train_loop, EpochStats, TrainConfig, TrainHistory, Trainer};
