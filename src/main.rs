use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use petals::{nn::FileWeights, pipeline, ExperimentConfig};
use tracing_subscriber::EnvFilter;

/// Fine-tune a pretrained VGG on a folder of flower photos and classify one image.
#[derive(Parser, Debug)]
#[command(name = "petals", version, about)]
struct Cli {
    /// TOML experiment config. Every key is optional.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dataset root with one subdirectory per class.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Comma-separated class names, in output order.
    #[arg(long, value_delimiter = ',')]
    classes: Option<Vec<String>>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    /// vgg11, vgg13, vgg16 or vgg19.
    #[arg(long)]
    backbone: Option<String>,

    /// Directory holding the pretrained `<backbone>.ot` weights.
    #[arg(long)]
    weights_dir: Option<PathBuf>,

    /// Image to classify after training.
    #[arg(long)]
    image: Option<PathBuf>,

    /// auto, cpu, cuda or cuda:N.
    #[arg(long)]
    device: Option<String>,

    #[arg(long)]
    seed: Option<u64>,

    /// Write per-epoch metrics to this JSON file.
    #[arg(long)]
    history: Option<PathBuf>,

    /// Fine-tune the backbone together with the head.
    #[arg(long)]
    unfreeze_backbone: bool,

    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    fn experiment_config(self) -> anyhow::Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::from_toml_file(path)?,
            None => ExperimentConfig::default(),
        };
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(classes) = self.classes {
            config.classes = classes;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
        if let Some(backbone) = self.backbone {
            config.backbone = backbone.parse()?;
        }
        if let Some(weights_dir) = self.weights_dir {
            config.weights_dir = weights_dir;
        }
        if let Some(image) = self.image {
            config.predict_image = Some(image);
        }
        if let Some(device) = self.device {
            config.device = device;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(history) = self.history {
            config.history_path = Some(history);
        }
        if self.unfreeze_backbone {
            config.freeze_backbone = false;
        }
        if self.no_progress {
            config.progress = false;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse()
        .experiment_config()
        .context("failed to build experiment configuration")?;
    let provider = FileWeights::new(&config.weights_dir);
    let outcome = pipeline::run(&config, &provider).context("experiment failed")?;

    if let Some(prediction) = outcome.prediction {
        println!("{}", prediction.label);
    }
    Ok(())
}
