use petals::{
    assert_tensor_eq,
    core::{Cellable, StateDict, StateDictIo},
    nn::{
        assemble, categorical_cross_entropy, Classifier, Module, StaticWeights, Trainable,
        VggBackboneBuilder, VggType,
    },
    tensor, ExperimentConfig,
};
use tch::{Device, Kind, Tensor};

fn pretrained(vgg_type: VggType) -> StateDict {
    let backbone = VggBackboneBuilder::default().vgg_type(vgg_type).build();
    let mut weights = backbone.state_dict();
    // libtorch archives also carry the ImageNet classifier
    weights.insert(
        "classifier.6.weight".to_owned(),
        Tensor::zeros([1000, 4096], (Kind::Float, Device::Cpu)).cell(),
    );
    weights
}

fn small_config(num_classes: usize) -> ExperimentConfig {
    ExperimentConfig {
        classes: (0..num_classes).map(|i| format!("class_{}", i)).collect(),
        image_width: 32,
        image_height: 32,
        hidden_units: 8,
        backbone: VggType::Vgg11,
        device: "cpu".to_owned(),
        ..ExperimentConfig::default()
    }
}

#[test]
fn vgg16_at_224_gives_five_probabilities() {
    let config = ExperimentConfig {
        hidden_units: 64,
        device: "cpu".to_owned(),
        ..ExperimentConfig::default()
    };
    let provider = StaticWeights::new().with("vgg16", pretrained(VggType::Vgg16));
    let assembly = assemble(&config, &provider).unwrap();

    let input = Tensor::rand([1, 3, 224, 224], (Kind::Float, Device::Cpu));
    let output = tch::no_grad(|| assembly.model.forward(&input));
    assert_eq!(output.size(), [1, 5]);
    let total = f64::try_from(output.sum(Kind::Double)).unwrap();
    assert!((total - 1.0).abs() < 1e-5);
    assert!(f64::try_from(output.min()).unwrap() >= 0.0);
}

#[test]
fn backbone_equals_provider_weights_after_assembly() {
    let weights = pretrained(VggType::Vgg11);
    let provider = StaticWeights::new().with("vgg11", weights.clone());
    let assembly = assemble(&small_config(3), &provider).unwrap();
    for (name, parameter) in assembly.model.backbone.state_dict() {
        let expected = weights[&name].lock();
        assert_tensor_eq!(*parameter.lock(), *expected);
    }
}

#[test]
fn frozen_backbone_is_left_out_of_training() {
    let provider = StaticWeights::new().with("vgg11", pretrained(VggType::Vgg11));
    let mut assembly = assemble(&small_config(3), &provider).unwrap();
    let model = &assembly.model;
    let head_tensors = model.head.state_dict().len();
    assert_eq!(assembly.optimizer.training_parameters().len(), head_tensors);

    let before_backbone = model.backbone.state_dict()["features.0.weight"].lock().copy();
    let before_head = model.head.state_dict()["output_layer.bias"].lock().copy();

    let input = Tensor::rand([2, 3, 32, 32], (Kind::Float, Device::Cpu));
    let labels = tensor!([[1.0f32, 0.0, 0.0], [0.0, 0.0, 1.0]]);
    assembly.optimizer.zero_grad();
    categorical_cross_entropy(&assembly.model.logits(&input), &labels).backward();
    assembly.optimizer.step();

    let model = &assembly.model;
    assert_tensor_eq!(
        *model.backbone.state_dict()["features.0.weight"].lock(),
        before_backbone
    );
    assert!(!petals::tensor_eq!(
        *model.head.state_dict()["output_layer.bias"].lock(),
        before_head,
        1e-12
    ));
}

#[test]
fn unfrozen_backbone_is_trained() {
    tch::manual_seed(7);
    let weights = pretrained(VggType::Vgg11);
    let before = weights["features.0.weight"].lock().copy();
    let provider = StaticWeights::new().with("vgg11", weights);
    let config = ExperimentConfig {
        freeze_backbone: false,
        hidden_units: 64,
        learning_rate: 0.1,
        ..small_config(3)
    };
    let mut assembly = assemble(&config, &provider).unwrap();
    assert_eq!(
        assembly.optimizer.training_parameters().len(),
        assembly.model.state_dict().len()
    );

    let input = Tensor::rand([2, 3, 32, 32], (Kind::Float, Device::Cpu));
    let labels = tensor!([[1.0f32, 0.0, 0.0], [0.0, 0.0, 1.0]]);
    assembly.optimizer.zero_grad();
    categorical_cross_entropy(&assembly.model.logits(&input), &labels).backward();
    assembly.optimizer.step();

    let trained = assembly.model.backbone.state_dict()["features.0.weight"].lock().copy();
    assert!(!petals::tensor_eq!(trained, before, 1e-12));
}

#[test]
fn model_reloads_its_own_weights() {
    let provider = StaticWeights::new().with("vgg11", pretrained(VggType::Vgg11));
    let model = assemble(&small_config(3), &provider).unwrap().model;
    let before = model.head.state_dict()["dense_1.weight"].lock().copy();

    let own = StaticWeights::new().with("vgg11", model.backbone.state_dict());
    model.load_backbone(&own).unwrap();
    model.load(&model.state_dict()).unwrap();
    assert_tensor_eq!(*model.head.state_dict()["dense_1.weight"].lock(), before);
}

#[test]
fn class_count_sets_output_width() {
    let provider = StaticWeights::new().with("vgg11", pretrained(VggType::Vgg11));
    for classes in [2, 5, 7] {
        let assembly = assemble(&small_config(classes), &provider).unwrap();
        let output = assembly
            .model
            .forward(&Tensor::rand([1, 3, 32, 32], (Kind::Float, Device::Cpu)));
        assert_eq!(output.size(), [1, classes as i64]);
    }
}

#[test]
fn unknown_backbone_name_is_a_provider_error() {
    let provider = StaticWeights::new().with("vgg16", pretrained(VggType::Vgg16));
    let error = assemble(&small_config(3), &provider).unwrap_err();
    assert!(error.is_provider_error());
}

#[test]
fn missing_tensor_is_a_provider_error() {
    let mut weights = pretrained(VggType::Vgg11);
    weights.remove("features.3.bias");
    let provider = StaticWeights::new().with("vgg11", weights);
    let error = assemble(&small_config(3), &provider).unwrap_err();
    assert!(error.is_provider_error());
    assert!(error.to_string().contains("features.3.bias"));
}

#[test]
fn mis_shaped_tensor_is_a_provider_error() {
    let mut weights = pretrained(VggType::Vgg11);
    weights.insert(
        "features.0.weight".to_owned(),
        Tensor::zeros([64, 1, 3, 3], (Kind::Float, Device::Cpu)).cell(),
    );
    let provider = StaticWeights::new().with("vgg11", weights);
    let error = assemble(&small_config(3), &provider).unwrap_err();
    assert!(error.is_provider_error());
}

#[test]
fn saved_model_loads_back() {
    let provider = StaticWeights::new().with("vgg11", pretrained(VggType::Vgg11));
    let first = assemble(&small_config(4), &provider).unwrap().model;
    let second = assemble(&small_config(4), &provider).unwrap().model;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.ot");
    first.save_ot(&path).unwrap();
    second.load_ot(&path).unwrap();

    let input = Tensor::rand([2, 3, 32, 32], (Kind::Float, Device::Cpu));
    assert_tensor_eq!(first.forward(&input), second.forward(&input), 1e-8);
    assert_eq!(StateDict::from_ot(&path).unwrap().len(), first.state_dict().len());
}
