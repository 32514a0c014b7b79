use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::{ActivationFunction, Init};
use crate::math::matrix::Matrix;

/// Fully connected layer operating on a whole batch of rows at once.
///
/// Gradients accumulate into `weights_grad` / `biases_grad` across calls to
/// `backward` until `zero_grad` clears them, mirroring the usual
/// zero-grad / backward / step cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub size: usize,
    pub input_size: usize,
    pub weights: Matrix,
    pub biases: Matrix,
    pub activator: ActivationFunction,
    #[serde(skip)]
    pub weights_grad: Matrix,
    #[serde(skip)]
    pub biases_grad: Matrix,
    #[serde(skip)]
    input: Matrix,
    #[serde(skip)]
    pre_neurons: Matrix, // z = XW + b, needed for the activation derivative
}

impl Layer {
    pub fn new<R: Rng + ?Sized>(
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Layer {
        let weights = match activation.init() {
            Init::He => Matrix::he(input_size, size, rng),
            Init::Xavier => Matrix::xavier(input_size, size, rng),
        };
        Layer {
            size,
            input_size,
            weights,
            biases: Matrix::zeros(1, size),
            activator: activation,
            weights_grad: Matrix::zeros(input_size, size),
            biases_grad: Matrix::zeros(1, size),
            input: Matrix::default(),
            pre_neurons: Matrix::default(),
        }
    }

    /// Forward pass that keeps the input and pre-activations for `backward`.
    pub fn feed_from(&mut self, input: Matrix) -> Matrix {
        let z = (&input * &self.weights).add_row(&self.biases);
        let a = z.map(|x| self.activator.function(x));
        self.input = input;
        self.pre_neurons = z;
        a
    }

    /// Forward pass without caching anything; leaves the layer untouched.
    pub fn infer(&self, input: &Matrix) -> Matrix {
        (input * &self.weights)
            .add_row(&self.biases)
            .map(|x| self.activator.function(x))
    }

    /// Accumulates parameter gradients for `grad_output` (dL/da for this
    /// layer) and returns dL/dx for the layer below.
    pub fn backward(&mut self, grad_output: &Matrix) -> Matrix {
        assert_eq!(
            grad_output.shape(),
            self.pre_neurons.shape(),
            "backward called without a matching forward pass"
        );
        self.ensure_grad_buffers();

        // δ = dL/da ⊙ σ'(z)
        let act_derivative = self.pre_neurons.map(|x| self.activator.derivative(x));
        let delta = grad_output.hadamard(&act_derivative);

        self.weights_grad.add_scaled(&(&self.input.transpose() * &delta), 1.0);
        self.biases_grad.add_scaled(&delta.sum_rows(), 1.0);

        &delta * &self.weights.transpose()
    }

    pub fn zero_grad(&mut self) {
        self.ensure_grad_buffers();
        self.weights_grad.fill(0.0);
        self.biases_grad.fill(0.0);
    }

    /// `(parameter, gradient)` pairs for the optimizer.
    pub fn params_mut(&mut self) -> [(&mut Matrix, &Matrix); 2] {
        [
            (&mut self.weights, &self.weights_grad),
            (&mut self.biases, &self.biases_grad),
        ]
    }

    // Layers loaded from JSON come back without gradient buffers.
    fn ensure_grad_buffers(&mut self) {
        if self.weights_grad.shape() != self.weights.shape() {
            self.weights_grad = Matrix::zeros(self.weights.rows, self.weights.cols);
        }
        if self.biases_grad.shape() != self.biases.shape() {
            self.biases_grad = Matrix::zeros(self.biases.rows, self.biases.cols);
        }
    }
}
