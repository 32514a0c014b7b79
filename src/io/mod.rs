pub mod checkpoint;
pub mod float;
pub mod samples;

pub use checkpoint::{Checkpoint, CheckpointWriter, JsonCheckpointWriter};
pub use samples::{PngSampleWriter, SampleWriter};
