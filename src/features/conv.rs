use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::features::extractor::FeatureExtractor;
use crate::math::ImageTensor;

/// 3x3 convolution, stride 1, zero padding 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv3x3 {
    pub in_channels: usize,
    pub out_channels: usize,
    /// `[out][in][ky][kx]`, flattened.
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Stage {
    Conv(Conv3x3),
    Relu,
    /// 2x2 max pool, stride 2. A trailing odd row/column is dropped.
    MaxPool,
}

/// A frozen VGG-style prefix: conv / ReLU / max-pool stages.
///
/// Weights are either loaded from a JSON file (see [`ConvFeatureExtractor::load_json`])
/// or taken from [`ConvFeatureExtractor::edge_bank`], a fixed set of
/// smoothing and edge filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvFeatureExtractor {
    pub stages: Vec<Stage>,
}

impl Conv3x3 {
    #[inline]
    fn w(&self, o: usize, i: usize, ky: usize, kx: usize) -> f64 {
        self.weights[((o * self.in_channels + i) * 3 + ky) * 3 + kx]
    }

    fn validate(&self) -> Result<()> {
        let expected = self.out_channels * self.in_channels * 9;
        if self.weights.len() != expected {
            return Err(Error::shape("Conv3x3 weights", &[expected], &[self.weights.len()]));
        }
        if self.bias.len() != self.out_channels {
            return Err(Error::shape("Conv3x3 bias", &[self.out_channels], &[self.bias.len()]));
        }
        Ok(())
    }

    fn check_input(&self, input: &ImageTensor) -> Result<()> {
        if input.channels != self.in_channels {
            return Err(Error::shape("Conv3x3 input channels", &[self.in_channels], &[input.channels]));
        }
        Ok(())
    }

    fn forward(&self, input: &ImageTensor) -> Result<ImageTensor> {
        self.check_input(input)?;
        let (h, w) = (input.height, input.width);
        let mut out = ImageTensor::zeros([input.batch, self.out_channels, h, w]);
        for n in 0..input.batch {
            for o in 0..self.out_channels {
                let base = out.index(n, o, 0, 0);
                out.data[base..base + h * w].iter_mut().for_each(|v| *v = self.bias[o]);
                for i in 0..self.in_channels {
                    let plane = input.plane(n, i);
                    for ky in 0..3 {
                        for kx in 0..3 {
                            let k = self.w(o, i, ky, kx);
                            if k == 0.0 {
                                continue;
                            }
                            for y in 0..h {
                                let sy = y as isize + ky as isize - 1;
                                if sy < 0 || sy >= h as isize {
                                    continue;
                                }
                                for x in 0..w {
                                    let sx = x as isize + kx as isize - 1;
                                    if sx < 0 || sx >= w as isize {
                                        continue;
                                    }
                                    out.data[base + y * w + x] += k * plane[sy as usize * w + sx as usize];
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn backward(&self, input: &ImageTensor, grad_out: &ImageTensor) -> Result<ImageTensor> {
        self.check_input(input)?;
        let (h, w) = (input.height, input.width);
        let mut grad_in = ImageTensor::zeros(input.shape());
        for n in 0..input.batch {
            for o in 0..self.out_channels {
                let g = grad_out.plane(n, o);
                for i in 0..self.in_channels {
                    let base = grad_in.index(n, i, 0, 0);
                    for ky in 0..3 {
                        for kx in 0..3 {
                            let k = self.w(o, i, ky, kx);
                            if k == 0.0 {
                                continue;
                            }
                            for y in 0..h {
                                let sy = y as isize + ky as isize - 1;
                                if sy < 0 || sy >= h as isize {
                                    continue;
                                }
                                for x in 0..w {
                                    let sx = x as isize + kx as isize - 1;
                                    if sx < 0 || sx >= w as isize {
                                        continue;
                                    }
                                    grad_in.data[base + sy as usize * w + sx as usize] += k * g[y * w + x];
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(grad_in)
    }
}

fn relu_forward(input: &ImageTensor) -> ImageTensor {
    let mut out = input.clone();
    out.data.iter_mut().for_each(|v| *v = v.max(0.0));
    out
}

fn relu_backward(input: &ImageTensor, grad_out: &ImageTensor) -> ImageTensor {
    let mut grad = grad_out.clone();
    for (g, &x) in grad.data.iter_mut().zip(&input.data) {
        if x <= 0.0 {
            *g = 0.0;
        }
    }
    grad
}

/// Index (into `input.data`) of the winning element of each pooling window.
fn max_pool_argmax(input: &ImageTensor) -> (ImageTensor, Vec<usize>) {
    let (oh, ow) = (input.height / 2, input.width / 2);
    let mut out = ImageTensor::zeros([input.batch, input.channels, oh, ow]);
    let mut winners = Vec::with_capacity(out.numel());
    for n in 0..input.batch {
        for c in 0..input.channels {
            for y in 0..oh {
                for x in 0..ow {
                    let mut best = input.index(n, c, 2 * y, 2 * x);
                    for (dy, dx) in [(0, 1), (1, 0), (1, 1)] {
                        let idx = input.index(n, c, 2 * y + dy, 2 * x + dx);
                        if input.data[idx] > input.data[best] {
                            best = idx;
                        }
                    }
                    let o = out.index(n, c, y, x);
                    out.data[o] = input.data[best];
                    winners.push(best);
                }
            }
        }
    }
    (out, winners)
}

impl ConvFeatureExtractor {
    /// Smoothing, signed Sobel and Laplacian filters applied to each input
    /// channel independently, then ReLU and one max-pool.
    pub fn edge_bank(channels: usize) -> ConvFeatureExtractor {
        const FILTERS: [[f64; 9]; 6] = [
            [1.0 / 9.0; 9],
            [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0],
            [1.0, 0.0, -1.0, 2.0, 0.0, -2.0, 1.0, 0.0, -1.0],
            [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0],
            [1.0, 2.0, 1.0, 0.0, 0.0, 0.0, -1.0, -2.0, -1.0],
            [0.0, 1.0, 0.0, 1.0, -4.0, 1.0, 0.0, 1.0, 0.0],
        ];
        let out_channels = channels * FILTERS.len();
        let mut weights = vec![0.0; out_channels * channels * 9];
        for c in 0..channels {
            for (f, filter) in FILTERS.iter().enumerate() {
                let o = c * FILTERS.len() + f;
                let start = (o * channels + c) * 9;
                weights[start..start + 9].copy_from_slice(filter);
            }
        }
        ConvFeatureExtractor {
            stages: vec![
                Stage::Conv(Conv3x3 {
                    in_channels: channels,
                    out_channels,
                    weights,
                    bias: vec![0.0; out_channels],
                }),
                Stage::Relu,
                Stage::MaxPool,
            ],
        }
    }

    /// Loads pretrained stages from JSON, checking every conv's dimensions and
    /// that channel counts chain from one conv to the next.
    pub fn load_json(path: impl AsRef<Path>) -> Result<ConvFeatureExtractor> {
        let reader = BufReader::new(File::open(path)?);
        let extractor: ConvFeatureExtractor = serde_json::from_reader(reader)?;
        extractor.validate()?;
        Ok(extractor)
    }

    pub fn validate(&self) -> Result<()> {
        let mut channels: Option<usize> = None;
        for stage in &self.stages {
            if let Stage::Conv(conv) = stage {
                conv.validate()?;
                if let Some(prev) = channels {
                    if prev != conv.in_channels {
                        return Err(Error::shape("feature stage channels", &[prev], &[conv.in_channels]));
                    }
                }
                channels = Some(conv.out_channels);
            }
        }
        Ok(())
    }
}

/// Per-stage values kept from a forward pass.
#[derive(Debug, Clone)]
enum Step {
    Conv(ImageTensor),
    Relu(ImageTensor),
    Pool { shape: [usize; 4], winners: Vec<usize> },
}

/// Forward pass record of a [`ConvFeatureExtractor`].
#[derive(Debug, Clone)]
pub struct FeatureTrace {
    steps: Vec<Step>,
    output_shape: [usize; 4],
}

impl FeatureExtractor for ConvFeatureExtractor {
    type Trace = FeatureTrace;

    fn forward_traced(&self, input: &ImageTensor) -> Result<(ImageTensor, FeatureTrace)> {
        let mut steps = Vec::with_capacity(self.stages.len());
        let mut current = input.clone();
        for stage in &self.stages {
            let next = match stage {
                Stage::Conv(conv) => conv.forward(&current)?,
                Stage::Relu => relu_forward(&current),
                Stage::MaxPool => {
                    let (pooled, winners) = max_pool_argmax(&current);
                    steps.push(Step::Pool { shape: current.shape(), winners });
                    current = pooled;
                    continue;
                }
            };
            let seen = std::mem::replace(&mut current, next);
            steps.push(match stage {
                Stage::Conv(_) => Step::Conv(seen),
                _ => Step::Relu(seen),
            });
        }
        let output_shape = current.shape();
        Ok((current, FeatureTrace { steps, output_shape }))
    }

    fn backward(&self, trace: &FeatureTrace, grad_features: &ImageTensor) -> Result<ImageTensor> {
        if grad_features.shape() != trace.output_shape {
            return Err(Error::shape("feature gradient", &trace.output_shape, &grad_features.shape()));
        }

        let mut grad = grad_features.clone();
        for (stage, step) in self.stages.iter().zip(&trace.steps).rev() {
            grad = match (stage, step) {
                (Stage::Conv(conv), Step::Conv(seen)) => conv.backward(seen, &grad)?,
                (Stage::Relu, Step::Relu(seen)) => relu_backward(seen, &grad),
                (Stage::MaxPool, Step::Pool { shape, winners }) => {
                    let mut routed = ImageTensor::zeros(*shape);
                    for (&src, &g) in winners.iter().zip(&grad.data) {
                        routed.data[src] += g;
                    }
                    routed
                }
                _ => return Err(Error::Config("feature trace does not match the extractor stages".into())),
            };
        }
        Ok(grad)
    }
}
