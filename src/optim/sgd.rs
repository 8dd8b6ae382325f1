use derive_builder::Builder;
use tch::{no_grad, Tensor};

use crate::{core::TensorCell, optim::optimizer::OptimizerAlgorithm};

/// Stochastic gradient descent with momentum.
///
/// Keeps one velocity per parameter and updates `v = momentum * v - lr * grad`, then `p += v`. With `nesterov`, `p += momentum * v - lr * grad` instead.
#[derive(Builder, Debug)]
#[builder(pattern = "owned")]
pub struct Sgd {
    #[builder(default = "0.01")]
    learning_rate: f64,
    #[builder(default = "0.")]
    momentum: f64,
    #[builder(default = "false")]
    nesterov: bool,
    #[builder(default = "Vec::new()", setter(skip))]
    velocity: Vec<Tensor>,
}

impl Sgd {
    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    pub fn nesterov(&self) -> bool {
        self.nesterov
    }
}

impl OptimizerAlgorithm for Sgd {
    fn init(&mut self, training_parameters: &[TensorCell]) {
        self.velocity = training_parameters
            .iter()
            .map(|parameter| Tensor::zeros_like(&parameter.lock()))
            .collect();
    }

    fn step(&mut self, training_parameters: &[TensorCell]) {
        for (parameter, velocity) in training_parameters.iter().zip(self.velocity.iter_mut()) {
            let mut parameter = parameter.lock();
            let grad = parameter.grad();
            // frozen or unused in this forward pass
            if !grad.defined() {
                continue;
            }
            no_grad(|| {
                *velocity = &*velocity * self.momentum - &grad * self.learning_rate;
                if self.nesterov {
                    *parameter += &*velocity * self.momentum - &grad * self.learning_rate;
                } else {
                    *parameter += &*velocity;
                }
            });
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}
