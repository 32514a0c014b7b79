use crate::error::Result;
use crate::math::ImageTensor;

/// A reconstruction-quality score over a batch of (output, target) pairs.
pub trait Metric {
    fn compute(&self, output: &ImageTensor, target: &ImageTensor) -> Result<f64>;
}
