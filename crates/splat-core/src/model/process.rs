//! Process status and snapshot records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one managed app instance.
///
/// `Failed` is sticky with respect to `Running`: a process only becomes
/// `Running` out of `Starting`, so a failed process can never be promoted
/// without a fresh startup attempt passing through `Starting` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Unknown,
    Starting,
    Running,
    Failed,
    Stopped,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Unknown => "unknown",
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running => "running",
            ProcessStatus::Failed => "failed",
            ProcessStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of one registry entry, used for status dumps and
/// reporting. Carries no live handles.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub uid: String,
    pub container_name: String,
    pub container_id: Option<String>,
    pub port: Option<u16>,
    pub status: ProcessStatus,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(ProcessStatus::Running.to_string(), "running");
        assert_eq!(ProcessStatus::Failed.to_string(), "failed");
    }
}
