use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::ModelState;
use crate::optim::OptimizerState;
use crate::train::train_config::TrainConfig;

/// A persisted best-so-far snapshot: enough to rebuild the model and resume
/// the optimizer exactly where it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub model_name: String,
    /// 1-based epoch the snapshot was taken after.
    pub epoch: usize,
    #[serde(with = "crate::io::float")]
    pub loss: f64,
    #[serde(with = "crate::io::float")]
    pub psnr: f64,
    #[serde(with = "crate::io::float")]
    pub ssim: f64,
    pub model: ModelState,
    pub optimizer: OptimizerState,
    pub config: TrainConfig,
}

/// Durable storage for checkpoints.
pub trait CheckpointWriter {
    fn persist(&mut self, checkpoint: &Checkpoint) -> Result<()>;
}

/// Writes `best.json` into a checkpoint directory, replacing the previous one.
///
/// The file is written next to its destination and renamed into place, so a
/// crash mid-write leaves the last good checkpoint intact.
#[derive(Debug, Clone)]
pub struct JsonCheckpointWriter {
    dir: PathBuf,
}

impl JsonCheckpointWriter {
    pub const FILE_NAME: &'static str = "best.json";

    pub fn new(dir: impl Into<PathBuf>) -> Result<JsonCheckpointWriter> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(JsonCheckpointWriter { dir })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(Self::FILE_NAME)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Checkpoint> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// The best checkpoint in `dir`, if one has been written.
    pub fn load_best(dir: impl AsRef<Path>) -> Result<Option<Checkpoint>> {
        let path = dir.as_ref().join(Self::FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        JsonCheckpointWriter::load(path).map(Some)
    }
}

impl CheckpointWriter for JsonCheckpointWriter {
    fn persist(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.path();
        let tmp = self.dir.join(format!("{}.tmp", Self::FILE_NAME));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, checkpoint)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        tracing::debug!(
            path = %path.display(),
            epoch = checkpoint.epoch,
            psnr = checkpoint.psnr,
            "saved checkpoint"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{ImageTensor, Matrix};
    use crate::model::{EnhancerSpec, Model, PatchEnhancer};
    use crate::optim::OptimizerKind;
    use rand::{rngs::StdRng, SeedableRng};

    fn checkpoint(epoch: usize, psnr: f64) -> Checkpoint {
        Checkpoint {
            model_name: "unit".into(),
            epoch,
            loss: 0.125,
            psnr,
            ssim: 0.8,
            model: ModelState { params: vec![Matrix::from_vec(1, 2, vec![0.5, -0.25])] },
            optimizer: OptimizerState::Sgd { learning_rate: 0.01 },
            config: TrainConfig::default(),
        }
    }

    #[test]
    fn persisted_checkpoint_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = JsonCheckpointWriter::new(dir.path().join("ckpt")).unwrap();
        writer.persist(&checkpoint(3, 21.5)).unwrap();
        writer.persist(&checkpoint(7, f64::INFINITY)).unwrap();

        let loaded = JsonCheckpointWriter::load_best(dir.path().join("ckpt")).unwrap().unwrap();
        assert_eq!(loaded.epoch, 7);
        assert!(loaded.psnr.is_infinite());
        assert_eq!(loaded.model, checkpoint(7, 0.0).model);
        assert!(!dir.path().join("ckpt/best.json.tmp").exists());
    }

    #[test]
    fn missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(JsonCheckpointWriter::load_best(dir.path()).unwrap().is_none());
    }

    #[test]
    fn trained_weights_and_moments_reload_bit_for_bit() {
        let mut model = PatchEnhancer::new(EnhancerSpec::default(), &mut StdRng::seed_from_u64(42)).unwrap();
        let mut adam = OptimizerKind::Adam.build(1e-3);
        let data = (0..48).map(|i| (i as f64 * 0.37).sin().abs()).collect();
        let input = ImageTensor::from_vec([1, 3, 4, 4], data).unwrap();
        let mut grad = model.forward(&input).unwrap();
        grad.data.iter_mut().for_each(|g| *g -= 0.5);
        model.backward(&grad).unwrap();
        adam.step(&mut model);

        let saved = Checkpoint {
            model: model.state(),
            optimizer: adam.state(),
            ..checkpoint(1, 17.25)
        };
        let dir = tempfile::tempdir().unwrap();
        JsonCheckpointWriter::new(dir.path()).unwrap().persist(&saved).unwrap();
        let loaded = JsonCheckpointWriter::load_best(dir.path()).unwrap().unwrap();

        assert_eq!(loaded, saved);
        let bits = |c: &Checkpoint| -> Vec<u64> {
            c.model.params.iter().flat_map(|m| m.data.iter().map(|v| v.to_bits())).collect()
        };
        assert_eq!(bits(&loaded), bits(&saved));
    }
}
