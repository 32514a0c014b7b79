use crate::error::{Error, Result};
use crate::model::Model;
use crate::optim::optimizer::{Optimizer, OptimizerState};

/// Plain stochastic gradient descent: `θ ← θ − lr · g`.
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, model: &mut dyn Model) {
        for param in model.parameters_mut() {
            param.value.add_scaled(param.grad, -self.learning_rate);
        }
    }

    fn state(&self) -> OptimizerState {
        OptimizerState::Sgd { learning_rate: self.learning_rate }
    }

    fn load_state(&mut self, state: OptimizerState) -> Result<()> {
        match state {
            OptimizerState::Sgd { learning_rate } => {
                self.learning_rate = learning_rate;
                Ok(())
            }
            other => Err(Error::Config(format!("cannot load {} state into sgd", other.kind()))),
        }
    }
}
