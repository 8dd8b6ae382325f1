//! Transfer learning on image folders: a pretrained VGG backbone with a new
//! dense head, trained with SGD and used to classify single images.

extern crate self as petals;

pub mod config;
pub mod core;
pub mod dataset;
pub mod error;
pub mod nn;
pub mod optim;
pub mod pipeline;
pub mod predictor;

pub use config::ExperimentConfig;
pub use error::{PetalsError, Result};
