//! Volume mapping with source path validation.

use crate::error::{CoreError, Result};
use crate::model::VolumeSpec;
use std::path::{Component, Path, PathBuf};

/// Mount root inside the container; each volume lands at
/// `/var/splat/<name>`.
pub const TARGET_MOUNT_ROOT: &str = "/var/splat";

/// A validated volume bind. `source` is absolute and guaranteed to live
/// under the allowed host root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMapping {
    pub name: String,
    pub source: PathBuf,
    pub target: PathBuf,
}

impl VolumeMapping {
    /// Resolve a volume request against the allowed host root. Relative
    /// sources are anchored at the root; `..` components are normalized
    /// lexically and any source escaping the root is rejected before the
    /// container sees it.
    pub fn resolve(spec: &VolumeSpec, allowed_root: &Path) -> Result<Self> {
        let joined = if spec.source.is_absolute() {
            spec.source.clone()
        } else {
            allowed_root.join(&spec.source)
        };

        let resolved = normalize(&joined).ok_or_else(|| CoreError::VolumeEscapesFilesystem {
            name: spec.name.clone(),
            source_path: spec.source.clone(),
        })?;

        if !resolved.starts_with(allowed_root) {
            return Err(CoreError::VolumeOutsideRoot {
                name: spec.name.clone(),
                source_path: spec.source.clone(),
                root: allowed_root.to_path_buf(),
            });
        }

        Ok(Self {
            name: spec.name.clone(),
            source: resolved,
            target: Path::new(TARGET_MOUNT_ROOT).join(&spec.name),
        })
    }

    /// Docker bind string, `source:target:rw`.
    pub fn bind(&self) -> String {
        format!("{}:{}:rw", self.source.display(), self.target.display())
    }
}

/// Lexical normalization: drops `.`, folds `..` into its parent. Returns
/// None when `..` would climb above the filesystem root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}
