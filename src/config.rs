//! Experiment configuration, loaded from TOML and overridden from the command line.
//!
//! Every field has a default, so an empty file (or no file at all) describes the
//! flower experiment: VGG16 backbone, five classes, 224x224 inputs, 15 epochs of
//! SGD with momentum.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tch::Device;

use crate::{
    dataset::{ClassLabels, ImagePreprocess},
    error::{PetalsError, Result},
    nn::VggType,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Root directory with one subdirectory per class.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Class names, in one-hot order. Each must be a subdirectory of `data_dir`.
    #[serde(default = "default_classes")]
    pub classes: Vec<String>,

    #[serde(default = "default_image_size")]
    pub image_width: u32,

    #[serde(default = "default_image_size")]
    pub image_height: u32,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Fraction of every class held out for validation.
    #[serde(default = "default_validation_split")]
    pub validation_split: f64,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_momentum")]
    pub momentum: f64,

    #[serde(default)]
    pub nesterov: bool,

    /// Width of the two hidden dense layers of the head.
    #[serde(default = "default_hidden_units")]
    pub hidden_units: i64,

    #[serde(default = "default_backbone")]
    pub backbone: VggType,

    /// Directory holding `<backbone>.ot` or `<backbone>.npz`.
    #[serde(default = "default_weights_dir")]
    pub weights_dir: PathBuf,

    /// Keep the pretrained backbone fixed and train only the head.
    #[serde(default = "default_true")]
    pub freeze_backbone: bool,

    /// Seeds libtorch and the training shuffle.
    #[serde(default)]
    pub seed: Option<u64>,

    /// `auto`, `cpu`, `cuda` or `cuda:<index>`.
    #[serde(default = "default_device")]
    pub device: String,

    /// Image classified after training.
    #[serde(default)]
    pub predict_image: Option<PathBuf>,

    /// Where to write the per-epoch metrics as JSON.
    #[serde(default)]
    pub history_path: Option<PathBuf>,

    /// Show a per-batch progress bar.
    #[serde(default = "default_true")]
    pub progress: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("datasets/flower_photos")
}
fn default_classes() -> Vec<String> {
    ["daisy", "dandelion", "roses", "sunflowers", "tulips"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_image_size() -> u32 {
    224
}
fn default_batch_size() -> usize {
    128
}
fn default_validation_split() -> f64 {
    0.2
}
fn default_epochs() -> usize {
    15
}
fn default_learning_rate() -> f64 {
    0.00005
}
fn default_momentum() -> f64 {
    0.9
}
fn default_hidden_units() -> i64 {
    4096
}
fn default_backbone() -> VggType {
    VggType::Vgg16
}
fn default_weights_dir() -> PathBuf {
    PathBuf::from("weights")
}
fn default_device() -> String {
    "auto".to_owned()
}
fn default_true() -> bool {
    true
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            classes: default_classes(),
            image_width: default_image_size(),
            image_height: default_image_size(),
            batch_size: default_batch_size(),
            validation_split: default_validation_split(),
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            momentum: default_momentum(),
            nesterov: false,
            hidden_units: default_hidden_units(),
            backbone: default_backbone(),
            weights_dir: default_weights_dir(),
            freeze_backbone: true,
            seed: None,
            device: default_device(),
            predict_image: None,
            history_path: None,
            progress: true,
        }
    }
}

impl ExperimentConfig {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| PetalsError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| PetalsError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded experiment config");
        Ok(config)
    }

    /// Rejects settings no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(PetalsError::Config(message));
        if self.batch_size == 0 {
            return fail("batch_size must be positive".to_owned());
        }
        if self.epochs == 0 {
            return fail("epochs must be positive".to_owned());
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return fail(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            ));
        }
        if !(self.learning_rate > 0.0) {
            return fail(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return fail(format!("momentum must be in [0, 1), got {}", self.momentum));
        }
        if self.image_width < 32 || self.image_height < 32 {
            return fail(format!(
                "images must be at least 32x32, got {}x{}",
                self.image_width, self.image_height
            ));
        }
        if self.hidden_units <= 0 {
            return fail(format!(
                "hidden_units must be positive, got {}",
                self.hidden_units
            ));
        }
        self.labels()?;
        self.device()?;
        self.torch_seed()?;
        Ok(())
    }

    /// The seed as libtorch takes it, which is signed.
    pub fn torch_seed(&self) -> Result<Option<i64>> {
        self.seed
            .map(|seed| {
                i64::try_from(seed).map_err(|_| {
                    PetalsError::Config(format!("seed {} is larger than {}", seed, i64::MAX))
                })
            })
            .transpose()
    }

    pub fn labels(&self) -> Result<ClassLabels> {
        ClassLabels::new(self.classes.iter().cloned())
    }

    pub fn preprocess(&self) -> ImagePreprocess {
        ImagePreprocess::new(self.image_width, self.image_height)
    }

    pub fn device(&self) -> Result<Device> {
        match self.device.as_str() {
            "auto" => Ok(Device::cuda_if_available()),
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|index| index.parse().ok())
                .map(Device::Cuda)
                .ok_or_else(|| PetalsError::Config(format!("unknown device {:?}", other))),
        }
    }
}
