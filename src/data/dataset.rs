use std::fs;
use std::path::{Path, PathBuf};

use crate::data::image::load_rgb;
use crate::error::{Error, Result};
use crate::math::ImageTensor;

/// One `(low-light input, reference target)` pair, each `1 x 3 x S x S`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub input: ImageTensor,
    pub target: ImageTensor,
}

/// Random-access source of samples. Shared with the prefetch worker, hence
/// `Send + Sync`.
pub trait Dataset: Send + Sync {
    fn name(&self) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Result<Sample>;
}

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Paired images on disk: `low_dir/<name>` is enhanced into `high_dir/<name>`.
///
/// Images are decoded lazily in `get`, so only the file list is held in memory.
#[derive(Debug, Clone)]
pub struct LowLightDataset {
    name: String,
    pairs: Vec<(PathBuf, PathBuf)>,
    size: u32,
}

impl LowLightDataset {
    /// Lists every image in `low_dir` (sorted by file name) and pairs it with
    /// the file of the same name in `high_dir`.
    pub fn open(
        name: impl Into<String>,
        low_dir: impl AsRef<Path>,
        high_dir: impl AsRef<Path>,
        size: u32,
    ) -> Result<LowLightDataset> {
        let (low_dir, high_dir) = (low_dir.as_ref(), high_dir.as_ref());
        for dir in [low_dir, high_dir] {
            if !dir.is_dir() {
                return Err(Error::Config(format!("`{}` is not a directory", dir.display())));
            }
        }

        let mut lows: Vec<PathBuf> = fs::read_dir(low_dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        lows.retain(|p| p.is_file() && is_image(p));
        lows.sort();

        let pairs = lows
            .into_iter()
            .map(|low| {
                let high = high_dir.join(low.file_name().unwrap_or_default());
                if high.is_file() {
                    Ok((low, high))
                } else {
                    Err(Error::MissingPair(low))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let name = name.into();
        tracing::debug!(dataset = %name, pairs = pairs.len(), size, "indexed image pairs");
        Ok(LowLightDataset { name, pairs, size })
    }

    /// Opens `<root>/<split>/low` against `<root>/<split>/high`.
    pub fn open_split(root: impl AsRef<Path>, split: &str, size: u32) -> Result<LowLightDataset> {
        let base = root.as_ref().join(split);
        LowLightDataset::open(split, base.join("low"), base.join("high"), size)
    }

    pub fn pairs(&self) -> &[(PathBuf, PathBuf)] {
        &self.pairs
    }
}

impl Dataset for LowLightDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.pairs.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let (low, high) = &self.pairs[index];
        Ok(Sample {
            input: load_rgb(low, self.size)?,
            target: load_rgb(high, self.size)?,
        })
    }
}

/// Samples already decoded into memory.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    name: String,
    samples: Vec<Sample>,
}

impl InMemoryDataset {
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> InMemoryDataset {
        InMemoryDataset { name: name.into(), samples }
    }
}

impl Dataset for InMemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        Ok(self.samples[index].clone())
    }
}
