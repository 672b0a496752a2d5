use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(
        "volume '{}': source '{}' resolves outside the allowed root '{}'",
        name,
        source_path.display(),
        root.display()
    )]
    VolumeOutsideRoot {
        name: String,
        source_path: PathBuf,
        root: PathBuf,
    },

    #[error(
        "volume '{}': source '{}' escapes the filesystem root",
        name,
        source_path.display()
    )]
    VolumeEscapesFilesystem { name: String, source_path: PathBuf },

    #[error("process '{0}' not found in registry")]
    ProcessNotFound(String),

    #[error("host port range exhausted (base {base})")]
    PortsExhausted { base: u16 },
}

pub type Result<T> = std::result::Result<T, CoreError>;
