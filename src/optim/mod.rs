pub use optimizer::*;
pub use sgd::*;

pub mod optimizer;
pub mod sgd;
