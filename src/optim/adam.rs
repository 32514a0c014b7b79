use crate::error::{Error, Result};
use crate::math::Matrix;
use crate::model::Model;
use crate::optim::optimizer::{Optimizer, OptimizerState};

/// Adam (Kingma & Ba, 2015) with bias correction.
///
/// m = β1·m + (1−β1)·g
/// v = β2·v + (1−β2)·g²
/// θ = θ − lr · m̂ / (√v̂ + ε)
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    step: u64,
    m: Vec<Matrix>,
    v: Vec<Matrix>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Adam {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, model: &mut dyn Model) {
        let params = model.parameters_mut();

        // Moments are created on the first step, once parameter shapes are known.
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| Matrix::zeros(p.value.rows, p.value.cols)).collect();
            self.v = self.m.clone();
        }

        self.step += 1;
        let bias1 = 1.0 - self.beta1.powi(self.step as i32);
        let bias2 = 1.0 - self.beta2.powi(self.step as i32);

        for ((param, m), v) in params.into_iter().zip(&mut self.m).zip(&mut self.v) {
            for (((theta, &g), m), v) in param
                .value
                .data
                .iter_mut()
                .zip(&param.grad.data)
                .zip(&mut m.data)
                .zip(&mut v.data)
            {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                *theta -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
    }

    fn state(&self) -> OptimizerState {
        OptimizerState::Adam {
            learning_rate: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            step: self.step,
            m: self.m.clone(),
            v: self.v.clone(),
        }
    }

    fn load_state(&mut self, state: OptimizerState) -> Result<()> {
        match state {
            OptimizerState::Adam { learning_rate, beta1, beta2, epsilon, step, m, v } => {
                if m.len() != v.len() {
                    return Err(Error::shape("Adam moments", &[m.len()], &[v.len()]));
                }
                self.learning_rate = learning_rate;
                self.beta1 = beta1;
                self.beta2 = beta2;
                self.epsilon = epsilon;
                self.step = step;
                self.m = m;
                self.v = v;
                Ok(())
            }
            other => Err(Error::Config(format!("cannot load {} state into adam", other.kind()))),
        }
    }
}
