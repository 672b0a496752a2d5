use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read '{}': {}", path.display(), message)]
    Io { path: PathBuf, message: String },

    #[error("failed to parse '{}': {}", path.display(), message)]
    Parse { path: PathBuf, message: String },

    #[error("invalid definition in '{}': {}", path.display(), message)]
    Invalid { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
