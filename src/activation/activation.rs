use serde::{Serialize, Deserialize};
use std::fmt;

/// Element-wise activations available to the enhancer's dense layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivationFunction {
    Sigmoid,
    ReLU,
    LeakyReLU { alpha: f64 },
    Tanh,
    Identity,
}

/// Which weight initializer suits the layer feeding into an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    He,
    Xavier,
}

impl ActivationFunction {
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationFunction::ReLU => x.max(0.0),
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::Identity => x,
        }
    }

    /// Derivative evaluated at the pre-activation `x`.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            }
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { 1.0 } else { *alpha },
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::Identity => 1.0,
        }
    }

    /// He for the rectifiers, Xavier for the saturating/linear ones.
    pub fn init(&self) -> Init {
        match self {
            ActivationFunction::ReLU | ActivationFunction::LeakyReLU { .. } => Init::He,
            _ => Init::Xavier,
        }
    }
}

impl fmt::Display for ActivationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationFunction::Sigmoid => write!(f, "sigmoid"),
            ActivationFunction::ReLU => write!(f, "relu"),
            ActivationFunction::LeakyReLU { alpha } => write!(f, "leaky_relu({alpha})"),
            ActivationFunction::Tanh => write!(f, "tanh"),
            ActivationFunction::Identity => write!(f, "identity"),
        }
    }
}
