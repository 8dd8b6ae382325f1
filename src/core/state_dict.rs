use std::path::Path;

use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use tch::Tensor;

use super::{Cellable, TensorCell};
use crate::error::Result;

/// A `StateDict` is a collection of named tensors. It uses [LinkedHashMap] to preserve the insertion order of the tensors, so a module tree always enumerates its parameters in the same order as it applies its layers.
///
/// Names are paths through the module tree joined by `.`, for example `features.0.weight`. This is the naming libtorch uses in `.ot` archives, so pretrained weights can be loaded without renaming.
pub type StateDict = LinkedHashMap<String, TensorCell>;

/// Reading and writing whole [StateDict]s.
pub trait StateDictIo: Sized {
    /// Loads a [StateDict] from a numpy .npz file. The arrays in the file should be named as the path to them.
    fn from_npz<P: AsRef<Path>>(path: P) -> Result<Self>;

    /// Loads a [StateDict] from a .ot file, the archive format used by libtorch for named tensors.
    fn from_ot<P: AsRef<Path>>(path: P) -> Result<Self>;

    /// Saves the tensors to a .ot file.
    fn save_ot<P: AsRef<Path>>(&self, path: P) -> Result<()>;

    /// Total number of scalar elements over all tensors.
    fn numel(&self) -> usize;

    /// One line per tensor: name, shape and whether it is trainable.
    fn describe(&self) -> String;
}

impl StateDictIo for StateDict {
    fn from_npz<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Tensor::read_npz(path)?
            .into_iter()
            .map(|(key, tensor)| (key, tensor.cell()))
            .collect())
    }

    fn from_ot<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Tensor::load_multi(path)?
            .into_iter()
            .map(|(key, tensor)| (key, tensor.cell()))
            .collect())
    }

    fn save_ot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let named_tensors = self
            .iter()
            .map(|(name, tensor)| (name.clone(), tensor.lock().shallow_clone()))
            .collect::<Vec<_>>();
        Tensor::save_multi(&named_tensors, path)?;
        Ok(())
    }

    fn numel(&self) -> usize {
        self.values().map(|tensor| tensor.lock().numel()).sum()
    }

    fn describe(&self) -> String {
        self.iter()
            .map(|(name, tensor)| {
                let tensor = tensor.lock();
                format!(
                    "{:<40} [{}]{}",
                    name,
                    tensor.size().iter().join(", "),
                    if tensor.requires_grad() { "" } else { " (frozen)" }
                )
            })
            .join("\n")
    }
}
