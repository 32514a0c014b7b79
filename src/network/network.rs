use serde::{Serialize, Deserialize};

use crate::layers::dense::Layer;
use crate::math::matrix::Matrix;

/// A stack of dense layers applied row-wise to a batch matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub layers: Vec<Layer>,
}

impl Network {
    /// Forward pass; stores activations in each layer for backprop.
    pub fn forward(&mut self, input: Matrix) -> Matrix {
        let mut current = input;
        for layer in &mut self.layers {
            current = layer.feed_from(current);
        }
        current
    }

    /// Forward pass for evaluation; nothing is cached.
    pub fn infer(&self, input: &Matrix) -> Matrix {
        let mut layers = self.layers.iter();
        let Some(first) = layers.next() else {
            return input.clone();
        };
        layers.fold(first.infer(input), |current, layer| layer.infer(&current))
    }

    /// Backpropagates dL/d(output) through every layer, accumulating
    /// parameter gradients. Returns dL/d(input).
    pub fn backward(&mut self, grad_output: &Matrix) -> Matrix {
        let mut delta = grad_output.clone();
        for layer in self.layers.iter_mut().rev() {
            delta = layer.backward(&delta);
        }
        delta
    }

    pub fn zero_grad(&mut self) {
        self.layers.iter_mut().for_each(Layer::zero_grad);
    }

    pub fn params_mut(&mut self) -> Vec<(&mut Matrix, &Matrix)> {
        self.layers.iter_mut().flat_map(Layer::params_mut).collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weights.data.len() + l.biases.data.len())
            .sum()
    }
}
