use std::ops::{Deref, DerefMut};

use linked_hash_map::LinkedHashMap;
use tch::Tensor;

use super::{Module, Trainable, TrainableDict};

/// A module composed by a sequential of modules. Children are named by their position.
#[derive(Debug)]
pub struct Sequential(Vec<Box<dyn Module>>);

/// A sequential of modules with explicit names, applied in insertion order.
#[derive(Debug)]
pub struct NamedSequential(LinkedHashMap<String, Box<dyn Module>>);

impl Deref for Sequential {
    type Target = Vec<Box<dyn Module>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Sequential {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Deref for NamedSequential {
    type Target = LinkedHashMap<String, Box<dyn Module>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for NamedSequential {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<Box<dyn Module>>> for Sequential {
    fn from(seq: Vec<Box<dyn Module>>) -> Self {
        Sequential(seq)
    }
}

impl FromIterator<Box<dyn Module>> for Sequential {
    fn from_iter<I: IntoIterator<Item = Box<dyn Module>>>(iter: I) -> Self {
        Sequential(iter.into_iter().collect())
    }
}

impl FromIterator<(String, Box<dyn Module>)> for NamedSequential {
    fn from_iter<I: IntoIterator<Item = (String, Box<dyn Module>)>>(iter: I) -> Self {
        NamedSequential(iter.into_iter().collect())
    }
}

impl Trainable for Sequential {
    fn child_modules(&self) -> TrainableDict<'_> {
        self.iter()
            .enumerate()
            .map(|(i, module)| (i.to_string(), module as &dyn Trainable))
            .collect()
    }
}

impl Module for Sequential {
    fn forward(&self, input: &Tensor) -> Tensor {
        let mut x = input.shallow_clone();
        for module in self.iter() {
            x = module.forward(&x)
        }
        x
    }
}

impl Trainable for NamedSequential {
    fn child_modules(&self) -> TrainableDict<'_> {
        self.iter()
            .map(|(name, module)| (name.clone(), module as &dyn Trainable))
            .collect()
    }
}

impl Module for NamedSequential {
    fn forward(&self, input: &Tensor) -> Tensor {
        let mut x = input.shallow_clone();
        for module in self.values() {
            x = module.forward(&x)
        }
        x
    }
}

#[macro_export]
macro_rules! seq {
    ($($module:expr),* $(,)?) => {
        {
            $crate::nn::Sequential::from(vec![
                $(Box::new($module) as Box<dyn $crate::nn::Module>,)*
            ])
        }
    };
}

#[macro_export]
macro_rules! named_seq {
    ($($name:expr => $module:expr),* $(,)?) => {
        {
            vec![$(($name.to_string(), Box::new($module) as Box<dyn $crate::nn::Module>),)*]
                .into_iter()
                .collect::<$crate::nn::NamedSequential>()
        }
    };
}
