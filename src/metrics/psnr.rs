use crate::error::Result;
use crate::loss::MseLoss;
use crate::math::ImageTensor;
use crate::metrics::metric::Metric;

/// Peak signal-to-noise ratio in dB over the whole batch:
/// `10 · log10(range² / MSE)`. Identical inputs give `+inf`.
#[derive(Debug, Clone, Copy)]
pub struct Psnr {
    pub data_range: f64,
}

impl Psnr {
    pub fn new(data_range: f64) -> Psnr {
        Psnr { data_range }
    }
}

impl Default for Psnr {
    fn default() -> Self {
        Psnr::new(1.0)
    }
}

impl Metric for Psnr {
    fn compute(&self, output: &ImageTensor, target: &ImageTensor) -> Result<f64> {
        output.ensure_same_shape(target, "psnr output/target")?;
        let mse = MseLoss::loss(&output.data, &target.data)?;
        if mse == 0.0 {
            return Ok(f64::INFINITY);
        }
        Ok(10.0 * (self.data_range * self.data_range / mse).log10())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_error_of_a_tenth_is_20_db() {
        let t = ImageTensor::full([1, 3, 4, 4], 0.5);
        let o = ImageTensor::full([1, 3, 4, 4], 0.6);
        let psnr = Psnr::default().compute(&o, &t).unwrap();
        assert!((psnr - 20.0).abs() < 1e-9);
    }

    #[test]
    fn identical_images_are_infinite() {
        let t = ImageTensor::full([2, 3, 2, 2], 0.3);
        assert!(Psnr::default().compute(&t, &t).unwrap().is_infinite());
    }
}
