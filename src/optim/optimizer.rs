use crate::{core::TensorCell, nn::Trainable};

/// An update rule over a fixed list of parameters.
pub trait OptimizerAlgorithm {
    /// Called once with the parameters the optimizer will update, before any step.
    fn init(&mut self, training_parameters: &[TensorCell]);
    fn step(&mut self, training_parameters: &[TensorCell]);
    fn learning_rate(&self) -> f64;
    fn set_learning_rate(&mut self, lr: f64);
}

/// Binds an [OptimizerAlgorithm] to the trainable parameters of a model.
///
/// The parameter list is taken once at construction, so freezing must happen before the optimizer is created.
#[derive(Debug)]
pub struct Optimizer<T: OptimizerAlgorithm> {
    opt: T,
    training_parameters: Vec<TensorCell>,
    step: i64,
}

impl<T: OptimizerAlgorithm> Optimizer<T> {
    pub fn new(mut opt: T, model: &dyn Trainable) -> Optimizer<T> {
        let training_parameters = model.training_parameters();
        opt.init(&training_parameters);
        Optimizer {
            opt,
            training_parameters,
            step: 0,
        }
    }

    pub fn step(&mut self) {
        self.step += 1;
        self.opt.step(&self.training_parameters);
    }

    pub fn zero_grad(&self) {
        for parameter in &self.training_parameters {
            parameter.lock().zero_grad();
        }
    }

    /// Number of steps taken so far.
    pub fn steps(&self) -> i64 {
        self.step
    }

    pub fn algorithm(&self) -> &T {
        &self.opt
    }

    pub fn training_parameters(&self) -> &[TensorCell] {
        &self.training_parameters
    }
}
