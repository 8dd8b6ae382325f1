use std::{fmt, str::FromStr};

use petals_derive::ArchitectureBuilder;
use serde::{Deserialize, Serialize};
use tch::Tensor;

use crate::{error::PetalsError, seq};

use super::{
    Conv2dBuilder, MaxPooling2DBuilder, Module, ReLU, Sequential, Trainable, TrainableDict,
};

/// Channel plan of the convolutional part of a VGG network. `0` marks a 2x2 max pooling.
const VGG11: &[i64] = &[64, 0, 128, 0, 256, 256, 0, 512, 512, 0, 512, 512, 0];
const VGG13: &[i64] = &[
    64, 64, 0, 128, 128, 0, 256, 256, 0, 512, 512, 0, 512, 512, 0,
];
const VGG16: &[i64] = &[
    64, 64, 0, 128, 128, 0, 256, 256, 256, 0, 512, 512, 512, 0, 512, 512, 512, 0,
];
const VGG19: &[i64] = &[
    64, 64, 0, 128, 128, 0, 256, 256, 256, 256, 0, 512, 512, 512, 512, 0, 512, 512, 512, 512, 0,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VggType {
    Vgg11,
    Vgg13,
    Vgg16,
    Vgg19,
}

impl VggType {
    /// The name pretrained weights for this variant are published under.
    pub fn name(&self) -> &'static str {
        match self {
            VggType::Vgg11 => "vgg11",
            VggType::Vgg13 => "vgg13",
            VggType::Vgg16 => "vgg16",
            VggType::Vgg19 => "vgg19",
        }
    }

    fn layers(&self) -> &'static [i64] {
        match self {
            VggType::Vgg11 => VGG11,
            VggType::Vgg13 => VGG13,
            VggType::Vgg16 => VGG16,
            VggType::Vgg19 => VGG19,
        }
    }
}

impl fmt::Display for VggType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VggType {
    type Err = PetalsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vgg11" => Ok(VggType::Vgg11),
            "vgg13" => Ok(VggType::Vgg13),
            "vgg16" => Ok(VggType::Vgg16),
            "vgg19" => Ok(VggType::Vgg19),
            other => Err(PetalsError::Config(format!("unknown backbone {:?}", other))),
        }
    }
}

/// The convolutional part of VGG, without average pooling and classifier.
///
/// Parameters are named `features.<index>.weight` and `features.<index>.bias`, where the index counts every conv, ReLU and pooling layer. This matches the layout of the pretrained `.ot` archives distributed for libtorch, whose `classifier.*` entries are simply not used.
#[derive(Debug, ArchitectureBuilder)]
pub struct VggBackbone {
    pub features: Sequential,

    #[builder(default = "VggType::Vgg16")]
    pub vgg_type: VggType,
}

fn make_layers(layers: &[i64]) -> Sequential {
    let mut in_channel = 3;
    let mut features = seq!();
    for &channels in layers {
        if channels == 0 {
            features.push(Box::new(
                MaxPooling2DBuilder::default()
                    .kernel_size([2, 2])
                    .stride([2, 2])
                    .build(),
            ));
        } else {
            features.push(Box::new(
                Conv2dBuilder::default()
                    .in_channel(in_channel)
                    .out_channel(channels)
                    .kernel_size([3, 3])
                    .padding([1, 1])
                    .build(),
            ));
            features.push(Box::new(ReLU));
            in_channel = channels;
        }
    }
    features
}

impl Trainable for VggBackbone {
    fn child_modules(&self) -> TrainableDict<'_> {
        let mut result = TrainableDict::new();
        result.insert("features".to_owned(), &self.features);
        result
    }
}

impl Module for VggBackbone {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.features.forward(input)
    }
}

impl VggBackbone {
    pub fn new(config: VggBackboneConfig) -> VggBackbone {
        VggBackbone {
            features: make_layers(config.vgg_type.layers()),
            vgg_type: config.vgg_type,
        }
    }

    /// Number of features after flattening the feature map of a `height x width` input.
    ///
    /// Every variant ends with 512 channels after five halvings.
    pub fn output_dim(&self, height: i64, width: i64) -> i64 {
        512 * (height / 32) * (width / 32)
    }
}
