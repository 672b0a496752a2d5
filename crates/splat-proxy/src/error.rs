use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("failed to render route config: {0}")]
    Render(String),

    #[error("failed to install '{}': {}", path.display(), message)]
    Install { path: PathBuf, message: String },

    #[error("proxy reload failed: {0}")]
    Reload(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
