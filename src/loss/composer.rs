use crate::error::Result;
use crate::features::FeatureExtractor;
use crate::loss::mse::MseLoss;
use crate::math::ImageTensor;

/// Weight of the perceptual term used by the training binary.
pub const PERCEPTUAL_WEIGHT: f64 = 0.5;

/// The two terms of the combined loss and their weighted sum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossTerms {
    pub reconstruction: f64,
    pub perceptual: f64,
    pub total: f64,
}

/// `MSE(O, T) + w · MSE(F(O), F(T))` with `F` a frozen feature extractor.
pub struct LossComposer<F> {
    extractor: F,
    perceptual_weight: f64,
}

impl<F: FeatureExtractor> LossComposer<F> {
    pub fn new(extractor: F, perceptual_weight: f64) -> Self {
        LossComposer { extractor, perceptual_weight }
    }

    fn terms(&self, reconstruction: f64, perceptual: f64) -> LossTerms {
        LossTerms {
            reconstruction,
            perceptual,
            total: reconstruction + self.perceptual_weight * perceptual,
        }
    }

    pub fn evaluate(&self, output: &ImageTensor, target: &ImageTensor) -> Result<LossTerms> {
        output.ensure_same_shape(target, "loss output/target")?;
        let reconstruction = MseLoss::loss(&output.data, &target.data)?;
        let out_features = self.extractor.forward(output)?;
        let target_features = self.extractor.forward(target)?;
        let perceptual = MseLoss::loss(&out_features.data, &target_features.data)?;
        Ok(self.terms(reconstruction, perceptual))
    }

    /// Loss terms plus dL/d(output), the seed for the model's backward pass.
    ///
    /// Each image goes through the extractor once; the output's trace is
    /// reused for the vector-Jacobian product.
    pub fn evaluate_with_grad(
        &self,
        output: &ImageTensor,
        target: &ImageTensor,
    ) -> Result<(LossTerms, ImageTensor)> {
        output.ensure_same_shape(target, "loss output/target")?;
        let reconstruction = MseLoss::loss(&output.data, &target.data)?;
        let mut grad = output.clone();
        grad.data = MseLoss::derivative(&output.data, &target.data)?;

        let (out_features, trace) = self.extractor.forward_traced(output)?;
        let target_features = self.extractor.forward(target)?;
        let perceptual = MseLoss::loss(&out_features.data, &target_features.data)?;
        let mut feature_grad = out_features;
        feature_grad.data = MseLoss::derivative(&feature_grad.data, &target_features.data)?;
        let perceptual_grad = self.extractor.backward(&trace, &feature_grad)?;

        for (g, p) in grad.data.iter_mut().zip(&perceptual_grad.data) {
            *g += self.perceptual_weight * p;
        }
        Ok((self.terms(reconstruction, perceptual), grad))
    }
}
