pub use dataset::*;
pub use image_folder::*;
pub use labels::*;
pub use tensor_dataset::*;
pub use transform::*;

pub mod dataset;
pub mod image_folder;
pub mod labels;
pub mod tensor_dataset;
pub mod transform;
