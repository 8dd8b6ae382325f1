use std::{fs::File, io::BufWriter, path::Path};

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tch::{no_grad, Device, Tensor};
use tracing::{debug, info, warn};

use crate::{
    dataset::{DataLoader, Dataset},
    error::{PetalsError, Result},
    optim::{Optimizer, OptimizerAlgorithm},
};

use super::{categorical_accuracy, categorical_cross_entropy, Classifier};

/// Metrics of one pass: sample-weighted means of the batch loss and accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochMetrics>,
}

impl History {
    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| PetalsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        info!(path = %path.display(), "wrote training history");
        Ok(())
    }
}

#[derive(Default)]
struct Accumulator {
    loss: f64,
    correct: f64,
    samples: usize,
}

impl Accumulator {
    fn add(&mut self, loss: f64, accuracy: f64, samples: usize) {
        self.loss += loss * samples as f64;
        self.correct += accuracy * samples as f64;
        self.samples += samples;
    }

    fn metrics(&self) -> Option<Metrics> {
        (self.samples > 0).then(|| Metrics {
            loss: self.loss / self.samples as f64,
            accuracy: self.correct / self.samples as f64,
        })
    }
}

/// Fits a classifier to one-hot labelled batches with categorical cross-entropy on its logits.
pub struct Trainer<'a, M: Classifier + ?Sized, O: OptimizerAlgorithm> {
    model: &'a M,
    optimizer: &'a mut Optimizer<O>,
    device: Device,
    progress: bool,
}

impl<'a, M: Classifier + ?Sized, O: OptimizerAlgorithm> Trainer<'a, M, O> {
    pub fn new(model: &'a M, optimizer: &'a mut Optimizer<O>, device: Device) -> Self {
        Self {
            model,
            optimizer,
            device,
            progress: false,
        }
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Runs `epochs` passes over `training`, evaluating `validation` after each one.
    pub fn fit<D, V>(
        &mut self,
        training: &mut DataLoader<D>,
        validation: &mut DataLoader<V>,
        epochs: usize,
    ) -> Result<History>
    where
        D: Dataset<BatchType = (Tensor, Tensor)>,
        V: Dataset<BatchType = (Tensor, Tensor)>,
    {
        if validation.size() == 0 {
            warn!("validation subset is empty; validation metrics will be absent");
        }
        let mut history = History::default();
        for epoch in 1..=epochs {
            let train = self.train_epoch(training)?;
            let val = self.evaluate(validation)?;
            let metrics = EpochMetrics {
                epoch,
                loss: train.loss,
                accuracy: train.accuracy,
                val_loss: val.map(|m| m.loss),
                val_accuracy: val.map(|m| m.accuracy),
            };
            info!(
                epoch,
                epochs,
                loss = metrics.loss,
                accuracy = metrics.accuracy,
                val_loss = ?metrics.val_loss,
                val_accuracy = ?metrics.val_accuracy,
                "epoch finished"
            );
            history.epochs.push(metrics);
        }
        Ok(history)
    }

    /// One optimization pass: for every batch zero the gradients, forward, backward, step.
    pub fn train_epoch<D>(&mut self, loader: &mut DataLoader<D>) -> Result<Metrics>
    where
        D: Dataset<BatchType = (Tensor, Tensor)>,
    {
        let bar = self.progress_bar(loader.num_batches());
        let mut accumulator = Accumulator::default();
        for batch in loader.iter() {
            let (images, labels) = batch?;
            let (images, labels) = (images.to_device(self.device), labels.to_device(self.device));
            let samples = images.size()[0] as usize;

            self.optimizer.zero_grad();
            let logits = self.model.logits(&images);
            let loss = categorical_cross_entropy(&logits, &labels);
            loss.f_backward()?;
            self.optimizer.step();

            let loss = f64::try_from(&loss)?;
            let accuracy = no_grad(|| f64::try_from(categorical_accuracy(&logits, &labels)))?;
            accumulator.add(loss, accuracy, samples);
            debug!(loss, accuracy, samples, "training batch");
            bar.set_message(format!("loss {:.4}", loss));
            bar.inc(1);
        }
        bar.finish_and_clear();
        accumulator.metrics().ok_or_else(|| {
            PetalsError::Config("training subset is empty".to_owned())
        })
    }

    /// Loss and accuracy over `loader` without tracking gradients, `None` when it yields no samples.
    pub fn evaluate<D>(&self, loader: &mut DataLoader<D>) -> Result<Option<Metrics>>
    where
        D: Dataset<BatchType = (Tensor, Tensor)>,
    {
        let mut accumulator = Accumulator::default();
        no_grad(|| -> Result<()> {
            for batch in loader.iter() {
                let (images, labels) = batch?;
                let (images, labels) =
                    (images.to_device(self.device), labels.to_device(self.device));
                let logits = self.model.logits(&images);
                let loss = f64::try_from(categorical_cross_entropy(&logits, &labels))?;
                let accuracy = f64::try_from(categorical_accuracy(&logits, &labels))?;
                accumulator.add(loss, accuracy, images.size()[0] as usize);
            }
            Ok(())
        })?;
        Ok(accumulator.metrics())
    }

    fn progress_bar(&self, batches: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(batches as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        dataset::{DataLoaderConfigBuilder, TensorDataset},
        nn::{Linear, LinearBuilder, Module, Trainable, TrainableDict},
        optim::SgdBuilder,
        tensor,
    };

    use super::*;

    /// A single dense layer under a softmax.
    #[derive(Debug)]
    struct DenseSoftmax(Linear);

    impl DenseSoftmax {
        fn new(input_dim: i64, classes: i64) -> Self {
            Self(LinearBuilder::default().input_dim(input_dim).output_dim(classes).build())
        }
    }

    impl Trainable for DenseSoftmax {
        fn child_modules(&self) -> TrainableDict<'_> {
            let mut result = TrainableDict::new();
            result.insert("dense".to_owned(), &self.0);
            result
        }
    }

    impl Module for DenseSoftmax {
        fn forward(&self, input: &Tensor) -> Tensor {
            self.logits(input).softmax(-1, tch::Kind::Float)
        }
    }

    impl Classifier for DenseSoftmax {
        fn logits(&self, input: &Tensor) -> Tensor {
            self.0.forward(input)
        }
    }

    fn loader(inputs: Tensor, labels: Tensor, shuffle: bool) -> DataLoader<TensorDataset> {
        let config = DataLoaderConfigBuilder::default()
            .batch_size(4)
            .shuffle(shuffle)
            .seed(Some(3))
            .finish()
            .unwrap();
        DataLoader::new(TensorDataset::from_batch(&inputs, &labels), config)
    }

    #[test]
    fn fit_learns_separable_classes() {
        tch::manual_seed(0);
        let inputs = tensor!([
            [1.0f32, 0.0],
            [0.9, 0.1],
            [0.8, 0.0],
            [1.0, 0.2],
            [0.0, 1.0],
            [0.1, 0.9],
            [0.0, 0.8],
            [0.2, 1.0]
        ]);
        let labels = tensor!([
            [1.0f32, 0.0],
            [1.0, 0.0],
            [1.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [0.0, 1.0],
            [0.0, 1.0],
            [0.0, 1.0]
        ]);
        let model = DenseSoftmax::new(2, 2);
        let sgd = SgdBuilder::default()
            .learning_rate(0.5)
            .momentum(0.9)
            .build()
            .unwrap();
        let mut optimizer = Optimizer::new(sgd, &model);
        let mut training = loader(inputs.shallow_clone(), labels.shallow_clone(), true);
        let mut validation = loader(inputs, labels, false);

        let history = Trainer::new(&model, &mut optimizer, Device::Cpu)
            .fit(&mut training, &mut validation, 50)
            .unwrap();
        assert_eq!(history.len(), 50);
        let first = &history.epochs[0];
        let last = history.last().unwrap();
        assert!(last.loss < first.loss);
        assert_eq!(last.val_accuracy, Some(1.0));
        assert_eq!(optimizer.steps(), 100);
    }

    #[test]
    fn empty_validation_gives_no_metrics() {
        let model = DenseSoftmax::new(1, 2);
        let mut optimizer = Optimizer::new(SgdBuilder::default().build().unwrap(), &model);
        let labels = tensor!([[1.0f32, 0.0], [0.0, 1.0]]);
        let mut training = loader(tensor!([[1.0f32], [2.0]]), labels, false);
        let config = DataLoaderConfigBuilder::default().batch_size(4).finish().unwrap();
        let mut validation = DataLoader::new(TensorDataset::from_tensors(vec![], vec![]), config);

        let history = Trainer::new(&model, &mut optimizer, Device::Cpu)
            .fit(&mut training, &mut validation, 2)
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.epochs.iter().all(|e| e.val_loss.is_none() && e.val_accuracy.is_none()));
    }

    #[test]
    fn history_serializes_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = History {
            epochs: vec![EpochMetrics {
                epoch: 1,
                loss: 1.5,
                accuracy: 0.25,
                val_loss: None,
                val_accuracy: Some(0.5),
            }],
        };
        history.save_json(&path).unwrap();
        let read: History = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(read, history);
    }
}
