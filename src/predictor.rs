use std::path::Path;

use tch::{no_grad, Device, Kind};
use tracing::info;

use crate::{
    dataset::{ClassLabels, ImagePreprocess},
    error::{PetalsError, Result},
    nn::Module,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub label: String,
    /// One probability per class, in label order.
    pub probabilities: Vec<f64>,
}

/// Classifies single images with a trained model, preprocessing them exactly like the training loader.
pub struct Predictor<'a, M: Module + ?Sized> {
    model: &'a M,
    labels: &'a ClassLabels,
    preprocess: ImagePreprocess,
    device: Device,
}

impl<'a, M: Module + ?Sized> Predictor<'a, M> {
    pub fn new(
        model: &'a M,
        labels: &'a ClassLabels,
        preprocess: ImagePreprocess,
        device: Device,
    ) -> Self {
        Self {
            model,
            labels,
            preprocess,
            device,
        }
    }

    pub fn predict<P: AsRef<Path>>(&self, path: P) -> Result<Prediction> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PetalsError::MissingImage(path.to_path_buf()));
        }
        let image = self.preprocess.load(path)?.unsqueeze(0).to_device(self.device);
        let output = no_grad(|| self.model.forward(&image));
        let probabilities = output.get(0).to_kind(Kind::Double).to_device(Device::Cpu);
        let probabilities = Vec::<f64>::try_from(&probabilities)?;
        let index = self.labels.decode(&output.get(0))?;
        let label = self
            .labels
            .name(index)
            .ok_or_else(|| {
                PetalsError::Config(format!(
                    "model produced {} outputs for {} classes",
                    probabilities.len(),
                    self.labels.len()
                ))
            })?
            .to_owned();
        info!(image = %path.display(), class = %label, "predicted");
        Ok(Prediction {
            index,
            label,
            probabilities,
        })
    }
}
