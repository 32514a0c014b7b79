use crate::error::{Error, Result};

pub struct MseLoss;

impl MseLoss {
    /// Scalar MSE: mean((predicted - expected)²)
    pub fn loss(predicted: &[f64], expected: &[f64]) -> Result<f64> {
        MseLoss::check(predicted, expected)?;
        let n = predicted.len() as f64;
        Ok(predicted.iter().zip(expected)
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>() / n)
    }

    /// Gradient of the mean w.r.t. each prediction: 2·(predicted - expected) / n
    pub fn derivative(predicted: &[f64], expected: &[f64]) -> Result<Vec<f64>> {
        MseLoss::check(predicted, expected)?;
        let scale = 2.0 / predicted.len() as f64;
        Ok(predicted.iter().zip(expected)
            .map(|(a, b)| scale * (a - b))
            .collect())
    }

    fn check(predicted: &[f64], expected: &[f64]) -> Result<()> {
        if predicted.len() != expected.len() || predicted.is_empty() {
            return Err(Error::shape("MseLoss", &[expected.len()], &[predicted.len()]));
        }
        Ok(())
    }
}
