pub mod composer;
pub mod mse;

pub use composer::{LossComposer, LossTerms};
pub use mse::MseLoss;
