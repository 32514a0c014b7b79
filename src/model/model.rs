use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::math::{ImageTensor, Matrix};

/// A trainable parameter and the gradient accumulated for it.
pub struct Param<'a> {
    pub value: &'a mut Matrix,
    pub grad: &'a Matrix,
}

/// Snapshot of every parameter, in the order `parameters_mut` yields them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub params: Vec<Matrix>,
}

/// An image-to-image model the training loop can drive.
///
/// `forward` caches whatever `backward` needs; `infer` is the read-only path
/// used during validation.
pub trait Model {
    fn forward(&mut self, input: &ImageTensor) -> Result<ImageTensor>;

    fn infer(&self, input: &ImageTensor) -> Result<ImageTensor>;

    /// Accumulates parameter gradients for dL/d(output) of the last `forward`.
    fn backward(&mut self, grad_output: &ImageTensor) -> Result<()>;

    fn zero_grad(&mut self);

    fn parameters_mut(&mut self) -> Vec<Param<'_>>;

    fn state(&self) -> ModelState;

    fn load_state(&mut self, state: ModelState) -> Result<()>;
}
