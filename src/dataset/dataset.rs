use std::cmp::min;

use derive_builder::Builder;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::error::{PetalsError, Result};

/// A finite, indexable collection of samples that knows how to merge a few of them into a batch.
pub trait Dataset {
    type DataType: Clone;
    type BatchType;

    fn data(&self) -> &[Self::DataType];

    fn size(&self) -> usize {
        self.data().len()
    }

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Merges consecutive samples into one batch. This is where lazy samples get decoded.
    fn collate(&self, data: Vec<Self::DataType>) -> Result<Self::BatchType>;
}

#[derive(Builder, Debug, Clone)]
#[builder(pattern = "owned")]
pub struct DataLoaderConfig {
    pub batch_size: usize,

    /// Reshuffle the sample order at the start of every pass.
    #[builder(default = "false")]
    pub shuffle: bool,

    #[builder(default = "None")]
    pub seed: Option<u64>,
}

impl DataLoaderConfigBuilder {
    /// Like `build`, reporting a missing or zero batch size as a configuration error.
    pub fn finish(self) -> Result<DataLoaderConfig> {
        let config = self
            .build()
            .map_err(|e| PetalsError::Config(e.to_string()))?;
        if config.batch_size == 0 {
            return Err(PetalsError::Config("batch_size must be positive".to_owned()));
        }
        Ok(config)
    }
}

/// Restartable batched iteration over a [Dataset].
#[derive(Debug)]
pub struct DataLoader<D: Dataset> {
    dataset: D,
    config: DataLoaderConfig,
    order: Vec<usize>,
    rng: StdRng,
}

impl<D: Dataset> DataLoader<D> {
    pub fn new(dataset: D, config: DataLoaderConfig) -> Self {
        let order = (0..dataset.size()).collect();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            dataset,
            config,
            order,
            rng,
        }
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    pub fn size(&self) -> usize {
        self.dataset.size()
    }

    pub fn num_batches(&self) -> usize {
        (self.dataset.size() + self.config.batch_size - 1) / self.config.batch_size
    }

    /// Starts a new pass. The order is reshuffled first when shuffling is enabled.
    pub fn iter(&mut self) -> DataLoaderIter<'_, D> {
        if self.config.shuffle {
            self.order.shuffle(&mut self.rng);
        }
        DataLoaderIter {
            loader: self,
            position: 0,
        }
    }
}

pub struct DataLoaderIter<'a, D: Dataset> {
    loader: &'a DataLoader<D>,
    position: usize,
}

impl<'a, D: Dataset> Iterator for DataLoaderIter<'a, D> {
    type Item = Result<D::BatchType>;

    fn next(&mut self) -> Option<Self::Item> {
        let order = &self.loader.order;
        if self.position >= order.len() {
            return None;
        }
        let end = min(self.position + self.loader.config.batch_size, order.len());
        let data = self.loader.dataset.data();
        let batch = order[self.position..end]
            .iter()
            .map(|&index| data[index].clone())
            .collect();
        self.position = end;
        Some(self.loader.dataset.collate(batch))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.loader.order.len() - self.position;
        let batch_size = self.loader.config.batch_size;
        let batches = (remaining + batch_size - 1) / batch_size;
        (batches, Some(batches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Numbers(Vec<usize>);

    impl Dataset for Numbers {
        type DataType = usize;
        type BatchType = Vec<usize>;

        fn data(&self) -> &[usize] {
            &self.0
        }

        fn collate(&self, data: Vec<usize>) -> Result<Vec<usize>> {
            Ok(data)
        }
    }

    fn config(batch_size: usize, shuffle: bool, seed: u64) -> DataLoaderConfig {
        DataLoaderConfigBuilder::default()
            .batch_size(batch_size)
            .shuffle(shuffle)
            .seed(Some(seed))
            .finish()
            .unwrap()
    }

    #[test]
    fn last_batch_may_be_smaller() {
        let mut loader = DataLoader::new(Numbers((0..7).collect()), config(3, false, 0));
        assert_eq!(loader.num_batches(), 3);
        let batches = loader.iter().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
    }

    #[test]
    fn shuffle_is_a_permutation_that_changes_per_pass() {
        let mut loader = DataLoader::new(Numbers((0..64).collect()), config(8, true, 7));
        let first = loader.iter().map(|b| b.unwrap()).flatten().collect::<Vec<_>>();
        let second = loader.iter().map(|b| b.unwrap()).flatten().collect::<Vec<_>>();
        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, (0..64).collect::<Vec<_>>());
        assert_ne!(first, second);
    }

    #[test]
    fn same_seed_same_order() {
        let mut a = DataLoader::new(Numbers((0..32).collect()), config(4, true, 42));
        let mut b = DataLoader::new(Numbers((0..32).collect()), config(4, true, 42));
        let a = a.iter().map(|x| x.unwrap()).collect::<Vec<_>>();
        let b = b.iter().map(|x| x.unwrap()).collect::<Vec<_>>();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let error = DataLoaderConfigBuilder::default()
            .batch_size(0)
            .finish()
            .unwrap_err();
        assert!(error.is_configuration_error());
    }
}
