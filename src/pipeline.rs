//! The four stages of an experiment, run in order: load the image folders,
//! assemble the transfer model, train it, and classify one image.

use tracing::info;

use crate::{
    config::ExperimentConfig,
    dataset::{DataLoader, DataLoaderConfigBuilder, ImageFolder, ImageFolderDataset},
    error::{PetalsError, Result},
    nn::{assemble, History, Trainable, Trainer, TransferModel, WeightsProvider},
    predictor::{Prediction, Predictor},
};

/// Training and validation loaders over one scan of the dataset directory.
pub struct Loaders {
    pub training: DataLoader<ImageFolderDataset>,
    pub validation: DataLoader<ImageFolderDataset>,
}

/// Scans `config.data_dir` and splits it into a shuffled training loader and an ordered validation loader.
pub fn load_datasets(config: &ExperimentConfig) -> Result<Loaders> {
    let labels = config.labels()?;
    let folder = ImageFolder::scan(&config.data_dir, &labels)?;
    let (training, validation) = folder.split(config.validation_split, config.preprocess())?;
    let training = DataLoader::new(
        training,
        DataLoaderConfigBuilder::default()
            .batch_size(config.batch_size)
            .shuffle(true)
            .seed(config.seed)
            .finish()?,
    );
    let validation = DataLoader::new(
        validation,
        DataLoaderConfigBuilder::default()
            .batch_size(config.batch_size)
            .finish()?,
    );
    Ok(Loaders {
        training,
        validation,
    })
}

#[derive(Debug)]
pub struct RunOutcome {
    pub model: TransferModel,
    pub history: History,
    pub prediction: Option<Prediction>,
}

/// Runs a whole experiment. Configuration and dataset problems surface before the model is built.
pub fn run(config: &ExperimentConfig, provider: &dyn WeightsProvider) -> Result<RunOutcome> {
    config.validate()?;
    if let Some(seed) = config.torch_seed()? {
        tch::manual_seed(seed);
    }
    if let Some(path) = config.predict_image.as_ref().filter(|path| !path.is_file()) {
        return Err(PetalsError::MissingImage(path.clone()));
    }
    let device = config.device()?;
    info!(?device, data_dir = %config.data_dir.display(), "starting experiment");

    let mut loaders = load_datasets(config)?;

    let mut assembly = assemble(config, provider)?;
    info!("model summary:\n{}", assembly.model.summary());

    let history = Trainer::new(&assembly.model, &mut assembly.optimizer, device)
        .with_progress(config.progress)
        .fit(&mut loaders.training, &mut loaders.validation, config.epochs)?;
    if let Some(path) = &config.history_path {
        history.save_json(path)?;
    }

    let prediction = match &config.predict_image {
        Some(path) => {
            let labels = config.labels()?;
            let predictor =
                Predictor::new(&assembly.model, &labels, config.preprocess(), device);
            Some(predictor.predict(path)?)
        }
        None => None,
    };
    info!(
        parameters = assembly.model.parameter_size(),
        epochs = history.len(),
        "experiment finished"
    );
    Ok(RunOutcome {
        model: assembly.model,
        history,
        prediction,
    })
}
