use std::collections::HashSet;

use tch::{Kind, Tensor};

use crate::error::{PetalsError, Result};

/// The ordered set of class names. A class's position is its one-hot index, both when encoding labels and when decoding predictions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect::<Vec<String>>();
        if names.is_empty() {
            return Err(PetalsError::Config("class list is empty".to_owned()));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if name.is_empty() {
                return Err(PetalsError::Config("class names must not be empty".to_owned()));
            }
            if !seen.insert(name.as_str()) {
                return Err(PetalsError::Config(format!("class {:?} is listed twice", name)));
            }
        }
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// A `[len]` float vector with a single one at `index`, `None` past the last class.
    pub fn one_hot(&self, index: usize) -> Option<Tensor> {
        self.name(index)?;
        let mut values = vec![0f32; self.names.len()];
        values[index] = 1.0;
        Some(Tensor::from_slice(&values))
    }

    /// One-hot rows for several indices, `[indices.len(), len]`.
    pub fn one_hot_batch(&self, indices: &[usize]) -> Result<Tensor> {
        if let Some(index) = indices.iter().find(|&&i| self.name(i).is_none()) {
            return Err(PetalsError::Config(format!(
                "label index {} is out of range for {} classes",
                index,
                self.len()
            )));
        }
        let indices = indices.iter().map(|&i| i as i64).collect::<Vec<_>>();
        Ok(Tensor::from_slice(&indices)
            .f_one_hot(self.names.len() as i64)?
            .to_kind(Kind::Float))
    }

    /// Index of the largest entry of a probability (or one-hot) vector.
    pub fn decode(&self, probabilities: &Tensor) -> Result<usize> {
        let index = i64::try_from(probabilities.flatten(0, -1).argmax(0, false))?;
        Ok(index as usize)
    }
}
