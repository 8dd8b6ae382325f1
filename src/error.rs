use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PetalsError>;

/// Everything that can abort an experiment. Nothing here is retried.
#[derive(Debug, Error)]
pub enum PetalsError {
    #[error("dataset directory {0} does not exist")]
    MissingDataset(PathBuf),
    #[error("class folder for {class:?} not found at {path}")]
    MissingClass { class: String, path: PathBuf },
    #[error("class folder for {class:?} at {path} contains no images")]
    EmptyClass { class: String, path: PathBuf },
    #[error("image {0} not found")]
    MissingImage(PathBuf),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to read config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("pretrained weights {name:?} unavailable at {path}: {reason}")]
    Provider {
        name: String,
        path: PathBuf,
        reason: String,
    },
    #[error("no parameter named {0} in the loaded weights")]
    MissingParameter(String),
    #[error("parameter {name} has shape {expected:?} but the loaded weights have {found:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<i64>,
        found: Vec<i64>,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Torch(#[from] tch::TchError),
}

impl PetalsError {
    /// Errors caused by the experiment setup rather than by the runtime.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PetalsError::MissingDataset(_)
                | PetalsError::MissingClass { .. }
                | PetalsError::EmptyClass { .. }
                | PetalsError::MissingImage(_)
                | PetalsError::Config(_)
                | PetalsError::ConfigFile { .. }
                | PetalsError::ConfigParse { .. }
        )
    }

    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            PetalsError::Provider { .. }
                | PetalsError::MissingParameter(_)
                | PetalsError::ShapeMismatch { .. }
        )
    }
}
