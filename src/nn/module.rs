use std::{path::Path, sync::Arc};

use linked_hash_map::LinkedHashMap;
use tch::{no_grad, Device, Tensor};

use crate::{
    core::{StateDict, StateDictIo, TensorCell},
    error::{PetalsError, Result},
};

/// A `TrainableDict` is a collection of named child [Trainable]s. For the same reason as [StateDict], it uses [LinkedHashMap] to preserve the insertion order.
pub type TrainableDict<'a> = LinkedHashMap<String, &'a dyn Trainable>;

/// A trait for anything that has trainable parameters.
///
/// A parameter is *trainable* while its tensor requires grad. [Trainable::freeze] and [Trainable::unfreeze] move the whole subtree across that line, and [Trainable::training_parameters] is the partition an optimizer sees.
pub trait Trainable: std::fmt::Debug {
    /// Defines the parameters of the module. This does not include the parameters in child modules.
    ///
    /// By default, this returns an empty map. If your module has parameters, you should override this method.
    fn parameters(&self) -> StateDict {
        LinkedHashMap::new()
    }

    /// Defines the child modules of the module.
    ///
    /// By default, this returns an empty map. If your module has child modules, you should override this method.
    fn child_modules(&self) -> TrainableDict<'_> {
        LinkedHashMap::new()
    }

    /// Returns all parameters in the module, including the parameters in child modules, with their path as keys.
    ///
    /// For example, a model architecture like this:
    ///
    /// ```text
    /// SomeModule {
    ///     "layer1": Linear {
    ///         "weight": TensorCell,
    ///         "bias": TensorCell,
    ///     },
    ///     "layer2": Linear {
    ///         "weight": TensorCell,
    ///         "bias": TensorCell,
    ///     },
    /// }
    /// ```
    ///
    /// will return a `LinkedHashMap` like this:
    ///
    /// ```text
    /// LinkedHashMap {
    ///     "layer1.weight": TensorCell,
    ///     "layer1.bias": TensorCell,
    ///     "layer2.weight": TensorCell,
    ///     "layer2.bias": TensorCell,
    /// }
    /// ```
    fn state_dict(&self) -> StateDict {
        let mut parameters = self.parameters();
        for (name, child) in self.child_modules() {
            for (child_name, child_parameter) in child.state_dict() {
                parameters.insert(format!("{}.{}", name, child_name), child_parameter);
            }
        }
        parameters
    }

    /// Returns the number of scalar parameters of the module and its children.
    fn parameter_size(&self) -> usize {
        self.state_dict().numel()
    }

    /// Returns all parameters that are not frozen.
    fn training_parameters(&self) -> Vec<TensorCell> {
        self.state_dict()
            .into_iter()
            .map(|(_, parameter)| parameter)
            .filter(|tensor| tensor.lock().requires_grad())
            .collect()
    }

    /// Load the parameters from another `StateDict`.
    ///
    /// Every parameter of this module must be present in `parameters` with the same shape; the values are copied in place, so the trainable flag and the device of this module are kept. Extra entries in `parameters` are ignored.
    fn load(&self, parameters: &StateDict) -> Result<()> {
        for (name, parameter) in self.state_dict() {
            let other = parameters
                .get(&name)
                .ok_or_else(|| PetalsError::MissingParameter(name.clone()))?;
            // loading a module's own state dict
            if Arc::ptr_eq(&parameter, other) {
                continue;
            }
            let other = other.lock();
            let mut parameter = parameter.lock();
            if parameter.size() != other.size() {
                return Err(PetalsError::ShapeMismatch {
                    name,
                    expected: parameter.size(),
                    found: other.size(),
                });
            }
            no_grad(|| parameter.f_copy_(&other))?;
        }
        Ok(())
    }

    /// Load parameters from a .ot file.
    fn load_ot<P: AsRef<Path>>(&self, path: P) -> Result<()>
    where
        Self: Sized,
    {
        self.load(&StateDict::from_ot(path)?)
    }

    /// Load parameters from a numpy .npz file.
    fn load_npz<P: AsRef<Path>>(&self, path: P) -> Result<()>
    where
        Self: Sized,
    {
        self.load(&StateDict::from_npz(path)?)
    }

    /// Save all parameters to a .ot file, named as their path in the module tree.
    fn save_ot<P: AsRef<Path>>(&self, path: P) -> Result<()>
    where
        Self: Sized,
    {
        self.state_dict().save_ot(path)
    }

    /// Freeze the parameters of the module and its children.
    fn freeze(&self) {
        for tensor in self.state_dict().values() {
            let mut tensor = tensor.lock();
            no_grad(|| {
                *tensor = tensor.set_requires_grad(false);
            });
        }
    }

    /// Unfreeze the parameters of the module and its children.
    fn unfreeze(&self) {
        for tensor in self.state_dict().values() {
            let mut tensor = tensor.lock();
            no_grad(|| {
                *tensor = tensor.set_requires_grad(true);
            });
        }
    }

    /// Clear the gradients of the parameters of the module and its children.
    fn zero_grad(&self) {
        self.state_dict().values().for_each(|param| {
            let mut param = param.lock();
            param.zero_grad();
        });
    }

    /// Move the parameters to a certain device, keeping their trainable flag.
    fn to_device(&self, device: Device) {
        self.state_dict().values().for_each(|param| {
            let mut param = param.lock();
            let requires_grad = param.requires_grad();
            no_grad(|| {
                *param = param.to(device).set_requires_grad(requires_grad);
            })
        });
    }
}

/// A module is a neural network layer, which can be seen as a function from `Tensor` to `Tensor`, with some trainable parameters.
pub trait Module<InputType = Tensor, OutputType = Tensor>: Trainable {
    /// The forward function for Module.
    fn forward(&self, input: &InputType) -> OutputType;
}

/// A module whose `forward` ends in a softmax over class scores.
///
/// Training works on [Classifier::logits] so the loss keeps its gradient when the softmax saturates.
pub trait Classifier: Module {
    /// The class scores the final softmax is applied to.
    fn logits(&self, input: &Tensor) -> Tensor;
}

impl<T: Trainable + ?Sized> Trainable for Box<T> {
    fn parameters(&self) -> StateDict {
        (**self).parameters()
    }

    fn child_modules(&self) -> TrainableDict<'_> {
        (**self).child_modules()
    }
}

impl<T, U, M: Module<T, U> + ?Sized> Module<T, U> for Box<M> {
    fn forward(&self, input: &T) -> U {
        (**self).forward(input)
    }
}
