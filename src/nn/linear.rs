use petals_derive::ArchitectureBuilder;
use tch::{nn::Init, no_grad, Device, Kind, Tensor};

use crate::core::{Cellable, StateDict, TensorCell};

use super::{Module, Trainable};

/// A fully-connected layer computing `input * weight^T + bias`.
#[derive(Debug, ArchitectureBuilder)]
pub struct Linear {
    pub weight: TensorCell,
    pub bias: Option<TensorCell>,

    #[builder(setter(into))]
    pub input_dim: i64,

    #[builder(setter(into))]
    pub output_dim: i64,

    #[builder(default = "true")]
    pub with_bias: bool,

    /// Initialization of the weight. The bias always starts at zero.
    #[builder(default = "tch::nn::init::DEFAULT_KAIMING_UNIFORM")]
    pub weight_init: Init,
}

impl Trainable for Linear {
    fn parameters(&self) -> StateDict {
        let mut result = StateDict::new();
        result.insert("weight".to_owned(), self.weight.clone());
        if let Some(bias) = &self.bias {
            result.insert("bias".to_owned(), bias.clone());
        }
        result
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> Tensor {
        let weight = self.weight.lock();
        let output = input.matmul(&weight.tr());
        match &self.bias {
            Some(bias) => output + &*bias.lock(),
            None => output,
        }
    }
}

impl Linear {
    pub fn new(config: LinearConfig) -> Linear {
        let mut weight = Tensor::empty(
            [config.output_dim, config.input_dim],
            (Kind::Float, Device::Cpu),
        );
        no_grad(|| weight.init(config.weight_init));
        let bias = config.with_bias.then(|| {
            Tensor::zeros([config.output_dim], (Kind::Float, Device::Cpu))
                .set_requires_grad(true)
                .cell()
        });
        Linear {
            weight: weight.set_requires_grad(true).cell(),
            bias,
            input_dim: config.input_dim,
            output_dim: config.output_dim,
            with_bias: config.with_bias,
            weight_init: config.weight_init,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{assert_tensor_eq, tensor};

    use super::*;

    #[test]
    fn forward_applies_weight_and_bias() {
        let linear = LinearBuilder::default()
            .input_dim(2)
            .output_dim(1)
            .build();
        linear
            .load(&StateDict::from_iter([
                ("weight".to_owned(), tensor!([[2.0f32, -1.0]]).cell()),
                ("bias".to_owned(), tensor!([0.5f32]).cell()),
            ]))
            .unwrap();
        let output = linear.forward(&tensor!([[1.0f32, 1.0], [3.0, 2.0]]));
        assert_tensor_eq!(output, tensor!([[1.5f32], [4.5]]));
    }

    #[test]
    fn he_uniform_bounds_and_zero_bias() {
        let linear = LinearBuilder::default()
            .input_dim(24)
            .output_dim(16)
            .build();
        let limit = (6.0f64 / 24.0).sqrt();
        let weight = linear.weight.lock();
        assert!(f64::try_from(weight.abs().max()).unwrap() <= limit + 1e-6);
        assert!(weight.requires_grad());
        let bias = linear.bias.as_ref().unwrap().lock();
        assert_eq!(f64::try_from(bias.abs().sum(Kind::Double)).unwrap(), 0.0);
    }

    #[test]
    fn without_bias_has_one_parameter() {
        let linear = LinearBuilder::default()
            .input_dim(3)
            .output_dim(4)
            .with_bias(false)
            .build();
        assert_eq!(linear.state_dict().len(), 1);
        assert_eq!(linear.parameter_size(), 12);
    }
}
