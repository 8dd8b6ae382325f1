use petals_derive::{ArchitectureBuilder, NonParameterModule};
use tch::Tensor;

use super::Module;

/// A max pooling layer in 2 dimensions.
#[derive(Debug, NonParameterModule, ArchitectureBuilder)]
pub struct MaxPooling2D {
    #[builder(setter(into))]
    pub kernel_size: [i64; 2],

    /// Defaults to the kernel size, so windows do not overlap.
    #[builder(default = "self.kernel_size.unwrap_or([2, 2])")]
    pub stride: [i64; 2],

    #[builder(default = "[0, 0]")]
    pub padding: [i64; 2],

    #[builder(default = "[1, 1]")]
    pub dilation: [i64; 2],

    #[builder(default = "false")]
    pub ceil_mode: bool,
}

impl MaxPooling2D {
    pub fn new(config: MaxPooling2DConfig) -> Self {
        Self {
            kernel_size: config.kernel_size,
            stride: config.stride,
            padding: config.padding,
            dilation: config.dilation,
            ceil_mode: config.ceil_mode,
        }
    }
}

impl Module for MaxPooling2D {
    fn forward(&self, input: &Tensor) -> Tensor {
        input.max_pool2d(
            self.kernel_size,
            self.stride,
            self.padding,
            self.dilation,
            self.ceil_mode,
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::{assert_tensor_eq, tensor};

    use super::*;

    #[test]
    fn halves_and_takes_window_max() {
        let pool = MaxPooling2DBuilder::default().kernel_size([2, 2]).build();
        assert_eq!(pool.stride, [2, 2]);
        let input = tensor!([[[
            [1.0f32, 2.0, 5.0, 0.0],
            [3.0, 4.0, 1.0, 1.0],
            [0.0, 0.0, 9.0, 8.0],
            [0.0, 7.0, 6.0, 5.0]
        ]]]);
        assert_tensor_eq!(pool.forward(&input), tensor!([[[[4.0f32, 5.0], [7.0, 9.0]]]]));
    }
}
