pub use act_funcs::*;
pub use conv::*;
pub use linear::*;
pub use loss::*;
pub use module::*;
pub use pooling::*;
pub use pretrained::*;
pub use sequential::*;
pub use trainer::*;
pub use transfer::*;
pub use vgg::*;

pub mod act_funcs;
pub mod conv;
pub mod linear;
pub mod loss;
pub mod module;
pub mod pooling;
pub mod pretrained;
pub mod sequential;
pub mod trainer;
pub mod transfer;
pub mod vgg;
