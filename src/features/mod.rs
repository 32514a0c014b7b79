pub mod conv;
pub mod extractor;

pub use conv::{Conv3x3, ConvFeatureExtractor, FeatureTrace, Stage};
pub use extractor::FeatureExtractor;
