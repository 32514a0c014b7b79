use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::math::{ImageTensor, Matrix};
use crate::model::model::{Model, ModelState, Param};
use crate::network::{LayerSpec, Network, NetworkSpec};

/// Architecture of a [`PatchEnhancer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancerSpec {
    /// Colour channels in and out.
    pub channels: usize,
    /// Neighbourhood radius; each pixel sees a `(2r+1) x (2r+1)` window.
    pub patch_radius: usize,
    /// Hidden layers. The output layer (`channels` sigmoid units) is implied.
    pub hidden: Vec<LayerSpec>,
}

impl Default for EnhancerSpec {
    fn default() -> Self {
        EnhancerSpec {
            channels: 3,
            patch_radius: 1,
            hidden: vec![
                LayerSpec { size: 24, activation: ActivationFunction::LeakyReLU { alpha: 0.01 } },
                LayerSpec { size: 16, activation: ActivationFunction::LeakyReLU { alpha: 0.01 } },
            ],
        }
    }
}

impl EnhancerSpec {
    pub fn kernel(&self) -> usize {
        2 * self.patch_radius + 1
    }

    pub fn network_spec(&self) -> NetworkSpec {
        let mut layers = self.hidden.clone();
        layers.push(LayerSpec { size: self.channels, activation: ActivationFunction::Sigmoid });
        NetworkSpec {
            input_size: self.channels * self.kernel() * self.kernel(),
            layers,
        }
    }
}

/// Per-pixel MLP over a square RGB neighbourhood.
///
/// Every output pixel is predicted from the input window centred on it, with
/// edge pixels replicated at the borders. This is the same function as a
/// `k x k` convolution followed by a stack of `1 x 1` convolutions, expressed
/// with the dense layers of this crate by unfolding windows into rows.
#[derive(Debug, Clone)]
pub struct PatchEnhancer {
    spec: EnhancerSpec,
    network: Network,
    cached_shape: Option<[usize; 4]>,
}

impl PatchEnhancer {
    pub fn new<R: Rng + ?Sized>(spec: EnhancerSpec, rng: &mut R) -> Result<PatchEnhancer> {
        if spec.channels == 0 {
            return Err(Error::Config("enhancer needs at least one channel".into()));
        }
        let network = spec.network_spec().build(rng)?;
        Ok(PatchEnhancer { spec, network, cached_shape: None })
    }

    pub fn spec(&self) -> &EnhancerSpec {
        &self.spec
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Unfolds every pixel's window into one row: `(N*H*W) x (C*k*k)`.
    fn unfold(&self, input: &ImageTensor) -> Result<Matrix> {
        if input.channels != self.spec.channels {
            return Err(Error::shape(
                "PatchEnhancer input channels",
                &[self.spec.channels],
                &[input.channels],
            ));
        }
        let k = self.spec.kernel();
        let r = self.spec.patch_radius as isize;
        let (h, w) = (input.height as isize, input.width as isize);
        let cols = input.channels * k * k;
        let mut data = Vec::with_capacity(input.batch * input.height * input.width * cols);

        for n in 0..input.batch {
            for y in 0..h {
                for x in 0..w {
                    for c in 0..input.channels {
                        let plane = input.plane(n, c);
                        for dy in -r..=r {
                            let sy = (y + dy).clamp(0, h - 1) as usize;
                            for dx in -r..=r {
                                let sx = (x + dx).clamp(0, w - 1) as usize;
                                data.push(plane[sy * input.width + sx]);
                            }
                        }
                    }
                }
            }
        }

        Ok(Matrix::from_vec(input.batch * input.height * input.width, cols, data))
    }

    /// `(N*H*W) x C` rows back into NCHW.
    fn fold(rows: &Matrix, shape: [usize; 4]) -> ImageTensor {
        let mut out = ImageTensor::zeros(shape);
        let [batch, channels, height, width] = shape;
        let plane = height * width;
        for n in 0..batch {
            for p in 0..plane {
                let row = rows.row(n * plane + p);
                for c in 0..channels {
                    out.data[(n * channels + c) * plane + p] = row[c];
                }
            }
        }
        out
    }

    /// NCHW into `(N*H*W) x C` rows; the inverse of `fold`.
    fn to_rows(t: &ImageTensor) -> Matrix {
        let plane = t.height * t.width;
        let mut rows = Matrix::zeros(t.batch * plane, t.channels);
        for n in 0..t.batch {
            for c in 0..t.channels {
                for (p, &v) in t.plane(n, c).iter().enumerate() {
                    rows.data[(n * plane + p) * t.channels + c] = v;
                }
            }
        }
        rows
    }
}

impl Model for PatchEnhancer {
    fn forward(&mut self, input: &ImageTensor) -> Result<ImageTensor> {
        let cols = self.unfold(input)?;
        let rows = self.network.forward(cols);
        self.cached_shape = Some(input.shape());
        Ok(PatchEnhancer::fold(&rows, input.shape()))
    }

    fn infer(&self, input: &ImageTensor) -> Result<ImageTensor> {
        let cols = self.unfold(input)?;
        let rows = self.network.infer(&cols);
        Ok(PatchEnhancer::fold(&rows, input.shape()))
    }

    fn backward(&mut self, grad_output: &ImageTensor) -> Result<()> {
        let expected = self
            .cached_shape
            .ok_or_else(|| Error::Config("backward called before forward".into()))?;
        if grad_output.shape() != expected {
            return Err(Error::shape("PatchEnhancer::backward", &expected, &grad_output.shape()));
        }
        // The input is data, so dL/d(input) is dropped.
        self.network.backward(&PatchEnhancer::to_rows(grad_output));
        Ok(())
    }

    fn zero_grad(&mut self) {
        self.network.zero_grad();
    }

    fn parameters_mut(&mut self) -> Vec<Param<'_>> {
        self.network
            .params_mut()
            .into_iter()
            .map(|(value, grad)| Param { value, grad })
            .collect()
    }

    fn state(&self) -> ModelState {
        let params = self
            .network
            .layers
            .iter()
            .flat_map(|l| [l.weights.clone(), l.biases.clone()])
            .collect();
        ModelState { params }
    }

    fn load_state(&mut self, state: ModelState) -> Result<()> {
        let expected = self.network.layers.len() * 2;
        if state.params.len() != expected {
            return Err(Error::shape("ModelState parameter count", &[expected], &[state.params.len()]));
        }
        let mut params = state.params.into_iter();
        for layer in &mut self.network.layers {
            for slot in [&mut layer.weights, &mut layer.biases] {
                // Length was checked above.
                let Some(value) = params.next() else { break };
                if value.shape() != slot.shape() {
                    return Err(Error::shape("ModelState parameter", &slot.shape(), &value.shape()));
                }
                *slot = value;
            }
        }
        self.network.zero_grad();
        Ok(())
    }
}
