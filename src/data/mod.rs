pub mod dataset;
pub mod image;
pub mod loader;

pub use dataset::{Dataset, InMemoryDataset, LowLightDataset, Sample};
pub use loader::{Batch, Batches, DataLoader};
