use crate::error::Result;
use crate::math::ImageTensor;

/// A frozen image feature extractor used by the perceptual loss.
///
/// Implementations never change their own weights. `backward` maps a gradient
/// on the features back onto the input image (a vector-Jacobian product), so
/// the perceptual term can train the model in front of it.
pub trait FeatureExtractor {
    /// What `backward` needs from the forward pass that produced the features.
    type Trace;

    fn forward_traced(&self, input: &ImageTensor) -> Result<(ImageTensor, Self::Trace)>;

    fn backward(&self, trace: &Self::Trace, grad_features: &ImageTensor) -> Result<ImageTensor>;

    fn forward(&self, input: &ImageTensor) -> Result<ImageTensor> {
        Ok(self.forward_traced(input)?.0)
    }
}
