use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::Matrix;
use crate::model::Model;
use crate::optim::{adam::Adam, sgd::Sgd};

/// Everything an optimizer needs to continue exactly where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerState {
    Sgd {
        learning_rate: f64,
    },
    Adam {
        learning_rate: f64,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
        step: u64,
        m: Vec<Matrix>,
        v: Vec<Matrix>,
    },
}

impl OptimizerState {
    pub fn kind(&self) -> OptimizerKind {
        match self {
            OptimizerState::Sgd { .. } => OptimizerKind::Sgd,
            OptimizerState::Adam { .. } => OptimizerKind::Adam,
        }
    }
}

/// Updates a model's parameters from the gradients its `backward` accumulated.
pub trait Optimizer {
    /// Clears the model's gradient accumulators.
    fn zero_grad(&self, model: &mut dyn Model) {
        model.zero_grad();
    }

    /// Applies one update to every parameter.
    fn step(&mut self, model: &mut dyn Model);

    fn state(&self) -> OptimizerState;

    fn load_state(&mut self, state: OptimizerState) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

impl OptimizerKind {
    pub fn build(self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
            OptimizerKind::Adam => Box::new(Adam::new(learning_rate)),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adam" => Ok(OptimizerKind::Adam),
            other => Err(Error::Config(format!("unknown optimizer `{other}` (expected sgd or adam)"))),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Sgd => write!(f, "sgd"),
            OptimizerKind::Adam => write!(f, "adam"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ImageTensor;
    use crate::model::{ModelState, Param};

    /// One parameter vector with a fixed gradient.
    struct Fixed {
        value: Matrix,
        grad: Matrix,
    }

    impl Fixed {
        fn new(value: Vec<f64>, grad: Vec<f64>) -> Fixed {
            let n = value.len();
            Fixed { value: Matrix::from_vec(1, n, value), grad: Matrix::from_vec(1, n, grad) }
        }
    }

    impl Model for Fixed {
        fn forward(&mut self, input: &ImageTensor) -> Result<ImageTensor> {
            Ok(input.clone())
        }
        fn infer(&self, input: &ImageTensor) -> Result<ImageTensor> {
            Ok(input.clone())
        }
        fn backward(&mut self, _grad_output: &ImageTensor) -> Result<()> {
            Ok(())
        }
        fn zero_grad(&mut self) {
            self.grad.fill(0.0);
        }
        fn parameters_mut(&mut self) -> Vec<Param<'_>> {
            vec![Param { value: &mut self.value, grad: &self.grad }]
        }
        fn state(&self) -> ModelState {
            ModelState { params: vec![self.value.clone()] }
        }
        fn load_state(&mut self, state: ModelState) -> Result<()> {
            self.value = state.params[0].clone();
            Ok(())
        }
    }

    #[test]
    fn sgd_moves_against_the_gradient() {
        let mut model = Fixed::new(vec![1.0, -1.0], vec![0.5, -2.0]);
        let mut opt = OptimizerKind::Sgd.build(0.1);
        opt.step(&mut model);
        assert!((model.value.data[0] - 0.95).abs() < 1e-12);
        assert!((model.value.data[1] + 0.8).abs() < 1e-12);
    }

    #[test]
    fn adam_first_step_is_learning_rate_sized() {
        let mut model = Fixed::new(vec![0.0, 0.0], vec![3.0, -0.01]);
        let mut opt = OptimizerKind::Adam.build(1e-3);
        opt.step(&mut model);
        // With bias correction the first update is lr · sign(g).
        assert!((model.value.data[0] + 1e-3).abs() < 1e-9);
        assert!((model.value.data[1] - 1e-3).abs() < 1e-6);
    }

    #[test]
    fn zero_grad_clears_model_gradients() {
        let mut model = Fixed::new(vec![1.0], vec![4.0]);
        let opt = OptimizerKind::Sgd.build(0.1);
        opt.zero_grad(&mut model);
        assert_eq!(model.grad.data, vec![0.0]);
    }

    #[test]
    fn restored_adam_continues_identically() {
        let mut a_model = Fixed::new(vec![0.2, 0.4], vec![0.3, -0.1]);
        let mut a = OptimizerKind::Adam.build(0.01);
        a.step(&mut a_model);

        let mut b_model = Fixed::new(a_model.value.data.clone(), vec![0.3, -0.1]);
        let mut b = OptimizerKind::Adam.build(0.5);
        b.load_state(a.state()).unwrap();

        a.step(&mut a_model);
        b.step(&mut b_model);
        assert_eq!(a_model.value, b_model.value);
    }

    #[test]
    fn state_kind_must_match() {
        let mut sgd = OptimizerKind::Sgd.build(0.1);
        let adam_state = OptimizerKind::Adam.build(0.1).state();
        assert!(sgd.load_state(adam_state).is_err());
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Adam".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        assert!("rmsprop".parse::<OptimizerKind>().is_err());
    }
}
