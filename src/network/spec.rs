use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::dense::Layer;
use crate::network::network::Network;

/// Describes one layer in a network specification.
///
/// The input width of each layer is implied by the previous layer's `size`
/// (or by `NetworkSpec::input_size` for the first layer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub size: usize,
    pub activation: ActivationFunction,
}

/// A serializable description of a network architecture, stored alongside
/// checkpoints so the weights can be rebuilt into the right shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub input_size: usize,
    pub layers: Vec<LayerSpec>,
}

impl NetworkSpec {
    /// Builds a freshly initialized network; weights are drawn from `rng`.
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Network> {
        if self.input_size == 0 {
            return Err(Error::Config("network input size must be positive".into()));
        }
        if self.layers.is_empty() {
            return Err(Error::Config("network needs at least one layer".into()));
        }
        if let Some(bad) = self.layers.iter().position(|l| l.size == 0) {
            return Err(Error::Config(format!("layer {bad} has zero neurons")));
        }

        let mut input_size = self.input_size;
        let layers = self
            .layers
            .iter()
            .map(|spec| {
                let layer = Layer::new(spec.size, input_size, spec.activation, rng);
                input_size = spec.size;
                layer
            })
            .collect();
        Ok(Network { layers })
    }
}
