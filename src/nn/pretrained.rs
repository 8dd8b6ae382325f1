use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    core::{StateDict, StateDictIo},
    error::{PetalsError, Result},
};

/// Source of pretrained parameters, looked up by architecture name (`"vgg16"`).
pub trait WeightsProvider {
    fn fetch(&self, name: &str) -> Result<StateDict>;
}

/// Reads `<dir>/<name>.ot`, falling back to `<dir>/<name>.npz`.
#[derive(Debug, Clone)]
pub struct FileWeights {
    dir: PathBuf,
}

impl FileWeights {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl WeightsProvider for FileWeights {
    fn fetch(&self, name: &str) -> Result<StateDict> {
        let ot = self.dir.join(format!("{}.ot", name));
        let npz = self.dir.join(format!("{}.npz", name));
        let (path, loaded) = if ot.is_file() {
            let loaded = StateDict::from_ot(&ot);
            (ot, loaded)
        } else if npz.is_file() {
            let loaded = StateDict::from_npz(&npz);
            (npz, loaded)
        } else {
            return Err(PetalsError::Provider {
                name: name.to_owned(),
                path: ot,
                reason: "no .ot or .npz file".to_owned(),
            });
        };
        let state_dict = loaded.map_err(|e| PetalsError::Provider {
            name: name.to_owned(),
            path: path.clone(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), tensors = state_dict.len(), "read pretrained weights");
        Ok(state_dict)
    }
}

/// Weights already in memory, keyed by architecture name.
#[derive(Debug, Default)]
pub struct StaticWeights {
    weights: HashMap<String, StateDict>,
}

impl StaticWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, state_dict: StateDict) -> Self {
        self.weights.insert(name.to_owned(), state_dict);
        self
    }
}

impl WeightsProvider for StaticWeights {
    fn fetch(&self, name: &str) -> Result<StateDict> {
        self.weights
            .get(name)
            .cloned()
            .ok_or_else(|| PetalsError::Provider {
                name: name.to_owned(),
                path: PathBuf::new(),
                reason: "not registered".to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use tch::{Device, Kind, Tensor};

    use crate::core::Cellable;

    use super::*;

    #[test]
    fn reads_ot_archive_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut state_dict = StateDict::new();
        state_dict.insert(
            "features.0.weight".to_owned(),
            Tensor::ones([2, 3], (Kind::Float, Device::Cpu)).cell(),
        );
        state_dict.save_ot(dir.path().join("vgg16.ot")).unwrap();

        let fetched = FileWeights::new(dir.path()).fetch("vgg16").unwrap();
        assert_eq!(fetched["features.0.weight"].lock().size(), [2, 3]);
    }

    #[test]
    fn missing_archive_is_a_provider_error() {
        let dir = tempfile::tempdir().unwrap();
        let error = FileWeights::new(dir.path()).fetch("vgg19").unwrap_err();
        assert!(error.is_provider_error());
    }

    #[test]
    fn corrupt_archive_is_a_provider_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vgg16.ot"), b"not a tensor archive").unwrap();
        let error = FileWeights::new(dir.path()).fetch("vgg16").unwrap_err();
        assert!(error.is_provider_error());
    }
}
