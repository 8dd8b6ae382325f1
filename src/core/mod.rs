pub use state_dict::*;
pub use tensor::*;

pub mod state_dict;
pub mod tensor;
