use std::sync::Arc;

use tch::Tensor;

use super::Dataset;
use crate::error::Result;

/// An in-memory dataset of `(input, label)` tensor pairs.
#[derive(Debug, Clone)]
pub struct TensorDataset {
    samples: Vec<(Arc<Tensor>, Arc<Tensor>)>,
}

impl Dataset for TensorDataset {
    type DataType = (Arc<Tensor>, Arc<Tensor>);
    type BatchType = (Tensor, Tensor);

    fn data(&self) -> &[Self::DataType] {
        &self.samples
    }

    fn collate(&self, data: Vec<Self::DataType>) -> Result<Self::BatchType> {
        let (inputs, labels): (Vec<_>, Vec<_>) = data.into_iter().unzip();
        let inputs = inputs.iter().map(|x| x.as_ref()).collect::<Vec<_>>();
        let labels = labels.iter().map(|x| x.as_ref()).collect::<Vec<_>>();
        Ok((Tensor::f_stack(&inputs, 0)?, Tensor::f_stack(&labels, 0)?))
    }
}

impl TensorDataset {
    pub fn from_tensors(inputs: Vec<Arc<Tensor>>, labels: Vec<Arc<Tensor>>) -> Self {
        Self {
            samples: inputs.into_iter().zip(labels).collect(),
        }
    }

    /// Splits the first dimension of `inputs` and `labels` into samples.
    pub fn from_batch(inputs: &Tensor, labels: &Tensor) -> Self {
        let inputs = (0..inputs.size()[0]).map(|i| Arc::new(inputs.get(i)));
        let labels = (0..labels.size()[0]).map(|i| Arc::new(labels.get(i)));
        Self {
            samples: inputs.zip(labels).collect(),
        }
    }
}
