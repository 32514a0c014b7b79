use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::io::{Checkpoint, CheckpointWriter, SampleWriter};
use crate::math::ImageTensor;
use crate::train::epoch_stats::EpochStats;

/// Best validation PSNR seen so far in this run. Starts at 0.0 and only ever
/// grows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestRecord {
    #[serde(with = "crate::io::float")]
    psnr: f64,
}

impl BestRecord {
    pub fn new() -> BestRecord {
        BestRecord { psnr: 0.0 }
    }

    /// Restores a record from a checkpoint's PSNR.
    pub fn from_psnr(psnr: f64) -> BestRecord {
        BestRecord { psnr: psnr.max(0.0) }
    }

    pub fn psnr(&self) -> f64 {
        self.psnr
    }
}

impl Default for BestRecord {
    fn default() -> Self {
        BestRecord::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Save,
    Skip,
}

/// Save-on-improvement: a checkpoint is written only when validation PSNR
/// strictly beats the best so far. Ties do not count.
pub struct CheckpointPolicy;

impl CheckpointPolicy {
    pub fn decide(best: &BestRecord, val: &EpochStats) -> Decision {
        if val.psnr() > best.psnr {
            Decision::Save
        } else {
            Decision::Skip
        }
    }

    /// Runs the decision. On `Save` the record is raised, the checkpoint built
    /// by `snapshot` is persisted and `last_outputs` replace the best sample set.
    pub fn apply<S>(
        best: &mut BestRecord,
        val: &EpochStats,
        epoch: usize,
        last_outputs: &ImageTensor,
        snapshot: S,
        checkpoints: &mut dyn CheckpointWriter,
        samples: &mut dyn SampleWriter,
    ) -> Result<Decision>
    where
        S: FnOnce() -> Checkpoint,
    {
        let decision = CheckpointPolicy::decide(best, val);
        if decision == Decision::Save {
            tracing::info!(
                epoch,
                previous = best.psnr,
                psnr = val.psnr(),
                "validation PSNR improved; saving checkpoint"
            );
            best.psnr = val.psnr();
            checkpoints.persist(&snapshot())?;
            samples.persist(last_outputs, epoch, true)?;
        }
        Ok(decision)
    }
}
