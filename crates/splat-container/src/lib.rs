pub mod convert;
pub mod driver;
pub mod engine;
pub mod error;

pub use convert::*;
pub use driver::*;
pub use engine::*;
pub use error::*;
