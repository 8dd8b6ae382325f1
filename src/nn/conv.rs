use petals_derive::ArchitectureBuilder;
use tch::{no_grad, Device, Kind, Tensor};

use crate::core::{Cellable, StateDict, TensorCell};

use super::{Module, Trainable};

/// A 2D convolution over `[N, C, H, W]` input.
#[derive(Debug, ArchitectureBuilder)]
pub struct Conv2d {
    pub weight: TensorCell,
    pub bias: Option<TensorCell>,

    #[builder(setter(into))]
    pub kernel_size: [i64; 2],

    #[builder(setter(into))]
    pub in_channel: i64,

    #[builder(setter(into))]
    pub out_channel: i64,

    #[builder(default = "[1, 1]")]
    pub stride: [i64; 2],

    #[builder(default = "[0, 0]")]
    pub padding: [i64; 2],

    #[builder(default = "[1, 1]")]
    pub dilation: [i64; 2],

    #[builder(default = "true")]
    pub with_bias: bool,
}

impl Trainable for Conv2d {
    fn parameters(&self) -> StateDict {
        let mut result = StateDict::new();
        result.insert("weight".to_owned(), self.weight.clone());
        if let Some(bias) = &self.bias {
            result.insert("bias".to_owned(), bias.clone());
        }
        result
    }
}

impl Module for Conv2d {
    fn forward(&self, input: &Tensor) -> Tensor {
        let weight = self.weight.lock();
        let bias = self.bias.as_ref().map(|bias| bias.lock());
        input.conv2d(
            &weight,
            bias.as_deref(),
            self.stride,
            self.padding,
            self.dilation,
            1,
        )
    }
}

impl Conv2d {
    pub fn new(config: Conv2dConfig) -> Conv2d {
        let size = [
            config.out_channel,
            config.in_channel,
            config.kernel_size[0],
            config.kernel_size[1],
        ];
        let mut weight = Tensor::empty(size, (Kind::Float, Device::Cpu));
        no_grad(|| weight.init(tch::nn::init::DEFAULT_KAIMING_UNIFORM));
        let bias = config.with_bias.then(|| {
            Tensor::zeros([config.out_channel], (Kind::Float, Device::Cpu))
                .set_requires_grad(true)
                .cell()
        });
        Conv2d {
            weight: weight.set_requires_grad(true).cell(),
            bias,
            kernel_size: config.kernel_size,
            in_channel: config.in_channel,
            out_channel: config.out_channel,
            stride: config.stride,
            padding: config.padding,
            dilation: config.dilation,
            with_bias: config.with_bias,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_padding_keeps_spatial_size() {
        let conv = Conv2dBuilder::default()
            .kernel_size([3, 3])
            .in_channel(3)
            .out_channel(8)
            .padding([1, 1])
            .build();
        let input = Tensor::rand([2, 3, 10, 12], (Kind::Float, Device::Cpu));
        assert_eq!(conv.forward(&input).size(), [2, 8, 10, 12]);
    }

    #[test]
    fn parameters_follow_libtorch_layout() {
        let conv = Conv2dBuilder::default()
            .kernel_size([3, 3])
            .in_channel(3)
            .out_channel(64)
            .build();
        let parameters = conv.parameters();
        assert_eq!(parameters["weight"].lock().size(), [64, 3, 3, 3]);
        assert_eq!(parameters["bias"].lock().size(), [64]);
    }
}
