use std::path::PathBuf;

use thiserror::Error;

/// Every failure the training pipeline can surface.
///
/// None of these are recovered from inside the library: they propagate up to
/// the binary, which reports them and exits non-zero.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("data source `{0}` produced no batches")]
    EmptyDataSource(String),

    #[error("no reference image for `{}`", .0.display())]
    MissingPair(PathBuf),

    #[error("image error at `{}`: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("prefetch worker stopped before delivering batch {0}")]
    WorkerDisconnected(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn shape(context: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Error::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
