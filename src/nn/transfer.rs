use petals_derive::ArchitectureBuilder;
use tch::Tensor;
use tracing::{info, warn};

use crate::{
    config::ExperimentConfig,
    core::StateDictIo,
    error::{PetalsError, Result},
    named_seq,
    optim::{Optimizer, Sgd, SgdBuilder},
};

use super::{
    Classifier, Flatten, LinearBuilder, Module, NamedSequential, ReLU, Softmax, Trainable,
    TrainableDict, VggBackbone, VggBackboneBuilder, VggType, WeightsProvider,
};

/// A pretrained VGG feature extractor followed by a freshly initialized classification head:
/// flatten, two ReLU dense layers of `hidden_units`, and a softmax dense layer of `num_classes`.
#[derive(Debug, ArchitectureBuilder)]
pub struct TransferModel {
    pub backbone: VggBackbone,
    pub head: NamedSequential,

    #[builder(default = "VggType::Vgg16")]
    pub vgg_type: VggType,

    #[builder(default = "224")]
    pub image_height: i64,

    #[builder(default = "224")]
    pub image_width: i64,

    #[builder(default = "4096")]
    pub hidden_units: i64,

    #[builder(setter(into))]
    pub num_classes: i64,
}

impl Trainable for TransferModel {
    fn child_modules(&self) -> TrainableDict<'_> {
        let mut result = TrainableDict::new();
        result.insert("backbone".to_owned(), &self.backbone);
        result.insert("head".to_owned(), &self.head);
        result
    }
}

impl Module for TransferModel {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.head.forward(&self.backbone.forward(input))
    }
}

impl Classifier for TransferModel {
    fn logits(&self, input: &Tensor) -> Tensor {
        self.head
            .iter()
            .filter(|(name, _)| name.as_str() != "softmax")
            .fold(self.backbone.forward(input), |x, (_, layer)| layer.forward(&x))
    }
}

impl TransferModel {
    pub fn new(config: TransferModelConfig) -> TransferModel {
        let backbone = VggBackboneBuilder::default()
            .vgg_type(config.vgg_type)
            .build();
        let features = backbone.output_dim(config.image_height, config.image_width);
        let head = named_seq!(
            "flatten" => Flatten,
            "dense_1" => LinearBuilder::default()
                .input_dim(features)
                .output_dim(config.hidden_units)
                .build(),
            "relu_1" => ReLU,
            "dense_2" => LinearBuilder::default()
                .input_dim(config.hidden_units)
                .output_dim(config.hidden_units)
                .build(),
            "relu_2" => ReLU,
            "output_layer" => LinearBuilder::default()
                .input_dim(config.hidden_units)
                .output_dim(config.num_classes)
                .build(),
            "softmax" => Softmax,
        );
        TransferModel {
            backbone,
            head,
            vgg_type: config.vgg_type,
            image_height: config.image_height,
            image_width: config.image_width,
            hidden_units: config.hidden_units,
            num_classes: config.num_classes,
        }
    }

    /// Copies the provider's weights for this backbone variant into the backbone.
    pub fn load_backbone(&self, provider: &dyn WeightsProvider) -> Result<()> {
        let weights = provider.fetch(self.vgg_type.name())?;
        self.backbone.load(&weights)
    }

    /// Parameter table plus total, trainable and frozen counts.
    pub fn summary(&self) -> String {
        let state_dict = self.state_dict();
        let total = state_dict.numel();
        let trainable: usize = self
            .training_parameters()
            .iter()
            .map(|parameter| parameter.lock().numel())
            .sum();
        format!(
            "{}\nTotal params: {}\nTrainable params: {}\nNon-trainable params: {}",
            state_dict.describe(),
            total,
            trainable,
            total - trainable
        )
    }
}

/// A model ready to train: backbone weights loaded, freezing applied, parameters on the target device, and an SGD optimizer bound to whatever remained trainable.
#[derive(Debug)]
pub struct Assembly {
    pub model: TransferModel,
    pub optimizer: Optimizer<Sgd>,
}

/// Builds the transfer model described by `config`, loading backbone weights from `provider`.
pub fn assemble(config: &ExperimentConfig, provider: &dyn WeightsProvider) -> Result<Assembly> {
    let model = TransferModelBuilder::default()
        .vgg_type(config.backbone)
        .image_height(config.image_height as i64)
        .image_width(config.image_width as i64)
        .hidden_units(config.hidden_units)
        .num_classes(config.classes.len() as i64)
        .build();
    model.load_backbone(provider)?;
    if config.freeze_backbone {
        model.backbone.freeze();
    } else {
        warn!("backbone is not frozen; pretrained weights will be fine-tuned");
    }
    model.to_device(config.device()?);

    let sgd = SgdBuilder::default()
        .learning_rate(config.learning_rate)
        .momentum(config.momentum)
        .nesterov(config.nesterov)
        .build()
        .map_err(|e| PetalsError::Config(e.to_string()))?;
    let optimizer = Optimizer::new(sgd, &model);
    info!(
        backbone = %config.backbone,
        parameters = model.parameter_size(),
        trainable_tensors = optimizer.training_parameters().len(),
        "assembled transfer model"
    );
    Ok(Assembly { model, optimizer })
}
