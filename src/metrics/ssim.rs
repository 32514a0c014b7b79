use crate::error::{Error, Result};
use crate::math::ImageTensor;
use crate::metrics::metric::Metric;

/// Structural similarity with a Gaussian window, averaged over every valid
/// window position, channel and image in the batch.
///
/// Images smaller than the window shrink it to the largest odd size that fits.
#[derive(Debug, Clone, Copy)]
pub struct Ssim {
    pub kernel_size: usize,
    pub sigma: f64,
    pub data_range: f64,
    pub k1: f64,
    pub k2: f64,
}

impl Default for Ssim {
    fn default() -> Self {
        Ssim {
            kernel_size: 11,
            sigma: 1.5,
            data_range: 1.0,
            k1: 0.01,
            k2: 0.03,
        }
    }
}

fn gaussian(size: usize, sigma: f64) -> Vec<f64> {
    let center = (size / 2) as f64;
    let raw: Vec<f64> = (0..size)
        .map(|i| (-((i as f64 - center).powi(2)) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|v| v / sum).collect()
}

/// Separable "valid" filtering of one `h x w` plane.
fn filter_valid(plane: &[f64], h: usize, w: usize, kernel: &[f64]) -> Vec<f64> {
    let k = kernel.len();
    let (oh, ow) = (h - k + 1, w - k + 1);

    let mut horizontal = vec![0.0; h * ow];
    for y in 0..h {
        for x in 0..ow {
            horizontal[y * ow + x] = kernel
                .iter()
                .enumerate()
                .map(|(i, kv)| kv * plane[y * w + x + i])
                .sum();
        }
    }

    let mut out = vec![0.0; oh * ow];
    for y in 0..oh {
        for x in 0..ow {
            out[y * ow + x] = kernel
                .iter()
                .enumerate()
                .map(|(i, kv)| kv * horizontal[(y + i) * ow + x])
                .sum();
        }
    }
    out
}

impl Ssim {
    fn effective_kernel(&self, h: usize, w: usize) -> usize {
        let mut k = self.kernel_size.min(h).min(w);
        if k % 2 == 0 {
            k -= 1;
        }
        k
    }

    /// Mean SSIM of one pair of planes.
    fn plane_ssim(&self, x: &[f64], y: &[f64], h: usize, w: usize, kernel: &[f64]) -> f64 {
        let c1 = (self.k1 * self.data_range).powi(2);
        let c2 = (self.k2 * self.data_range).powi(2);

        let xx: Vec<f64> = x.iter().map(|v| v * v).collect();
        let yy: Vec<f64> = y.iter().map(|v| v * v).collect();
        let xy: Vec<f64> = x.iter().zip(y).map(|(a, b)| a * b).collect();

        let mu_x = filter_valid(x, h, w, kernel);
        let mu_y = filter_valid(y, h, w, kernel);
        let e_xx = filter_valid(&xx, h, w, kernel);
        let e_yy = filter_valid(&yy, h, w, kernel);
        let e_xy = filter_valid(&xy, h, w, kernel);

        let n = mu_x.len();
        let total: f64 = (0..n)
            .map(|i| {
                let (mx, my) = (mu_x[i], mu_y[i]);
                let var_x = e_xx[i] - mx * mx;
                let var_y = e_yy[i] - my * my;
                let cov = e_xy[i] - mx * my;
                ((2.0 * mx * my + c1) * (2.0 * cov + c2))
                    / ((mx * mx + my * my + c1) * (var_x + var_y + c2))
            })
            .sum();
        total / n as f64
    }
}

impl Metric for Ssim {
    fn compute(&self, output: &ImageTensor, target: &ImageTensor) -> Result<f64> {
        output.ensure_same_shape(target, "ssim output/target")?;
        if output.numel() == 0 {
            return Err(Error::shape("ssim input", &[1], &[0]));
        }
        let (h, w) = (output.height, output.width);
        let kernel = gaussian(self.effective_kernel(h, w), self.sigma);

        let mut total = 0.0;
        for n in 0..output.batch {
            for c in 0..output.channels {
                total += self.plane_ssim(output.plane(n, c), target.plane(n, c), h, w, &kernel);
            }
        }
        Ok(total / (output.batch * output.channels) as f64)
    }
}
