pub mod app;
pub mod port;
pub mod process;
pub mod volume;

pub use app::*;
pub use port::*;
pub use process::*;
pub use volume::*;
