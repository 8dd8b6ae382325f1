use petals_derive::NonParameterModule;
use tch::{Kind, Tensor};

use crate::nn::Module;

/// ReLU activation function.
///
/// See [Rectified Linear Units Improve Restricted Boltzmann Machines](https://www.cs.toronto.edu/~fritz/absps/reluICML.pdf).
#[derive(Debug, NonParameterModule)]
pub struct ReLU;

/// Softmax over the last dimension, turning scores into class probabilities.
#[derive(Debug, NonParameterModule)]
pub struct Softmax;

/// Flattens everything but the batch dimension.
#[derive(Debug, NonParameterModule)]
pub struct Flatten;

impl Module for ReLU {
    fn forward(&self, input: &Tensor) -> Tensor {
        input.relu()
    }
}

impl Module for Softmax {
    fn forward(&self, input: &Tensor) -> Tensor {
        input.softmax(-1, Kind::Float)
    }
}

impl Module for Flatten {
    fn forward(&self, input: &Tensor) -> Tensor {
        input.flatten(1, -1)
    }
}
