use std::fs;
use std::path::PathBuf;

use crate::data::image::tensor_to_rgb;
use crate::error::{Error, Result};
use crate::math::ImageTensor;

/// Storage for model outputs kept for visual inspection.
pub trait SampleWriter {
    /// Stores every image of `images`. `is_best` marks the best-so-far set,
    /// which replaces any previous best set.
    fn persist(&mut self, images: &ImageTensor, epoch: usize, is_best: bool) -> Result<()>;
}

/// Writes PNGs under a samples directory:
///
/// ```text
/// <dir>/epoch_020/<model>_00.png   periodic
/// <dir>/best/<model>_00.png        best so far (plus EPOCH with its epoch)
/// ```
#[derive(Debug, Clone)]
pub struct PngSampleWriter {
    dir: PathBuf,
    model_name: String,
}

impl PngSampleWriter {
    pub fn new(dir: impl Into<PathBuf>, model_name: impl Into<String>) -> Result<PngSampleWriter> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(PngSampleWriter { dir, model_name: model_name.into() })
    }

    pub fn epoch_dir(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("epoch_{epoch:03}"))
    }

    pub fn best_dir(&self) -> PathBuf {
        self.dir.join("best")
    }
}

impl SampleWriter for PngSampleWriter {
    fn persist(&mut self, images: &ImageTensor, epoch: usize, is_best: bool) -> Result<()> {
        let target = if is_best { self.best_dir() } else { self.epoch_dir(epoch) };
        if is_best && target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::create_dir_all(&target)?;

        for n in 0..images.batch {
            let path = target.join(format!("{}_{n:02}.png", self.model_name));
            tensor_to_rgb(images, n)?
                .save(&path)
                .map_err(|source| Error::Image { path: path.clone(), source })?;
        }
        if is_best {
            fs::write(target.join("EPOCH"), format!("{epoch}\n"))?;
        }

        tracing::debug!(dir = %target.display(), count = images.batch, epoch, is_best, "wrote sample images");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_and_best_sets_are_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PngSampleWriter::new(dir.path(), "m").unwrap();
        let images = ImageTensor::full([2, 3, 4, 4], 0.5);

        writer.persist(&images, 20, false).unwrap();
        assert!(writer.epoch_dir(20).join("m_01.png").is_file());

        writer.persist(&images, 3, true).unwrap();
        writer.persist(&images.item(0), 5, true).unwrap();
        let best = writer.best_dir();
        assert!(best.join("m_00.png").is_file());
        assert!(!best.join("m_01.png").exists(), "stale best images are removed");
        assert_eq!(fs::read_to_string(best.join("EPOCH")).unwrap(), "5\n");
    }
}
