pub mod allocator;
pub mod error;
pub mod model;
pub mod uid;

pub use allocator::*;
pub use error::*;
pub use model::*;
pub use uid::*;
