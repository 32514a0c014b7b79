pub mod enhancer;
pub mod model;

pub use enhancer::{EnhancerSpec, PatchEnhancer};
pub use model::{Model, ModelState, Param};
