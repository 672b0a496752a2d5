//! Container driver trait.

use crate::error::Result;
use splat_core::{PortMapping, VolumeMapping};
use std::future::Future;

/// The per-app lifecycle operations the controller drives. [`Engine`] is
/// the bollard-backed implementation; tests substitute recording doubles.
/// Written in desugared form: the futures must be `Send` because startup
/// tasks run on the multi-threaded runtime.
///
/// [`Engine`]: crate::Engine
pub trait ContainerDriver: Send + 'static {
    /// Set pull credentials for a remote registry.
    fn authenticate(&mut self, token: Option<&str>, registry: &str) -> Result<()>;

    fn pull_image(&mut self, repo: &str, tag: &str) -> impl Future<Output = Result<()>> + Send;

    /// Create and start a container under `identity`, returning its id.
    fn create_and_start(
        &mut self,
        identity: &str,
        image: &str,
        ports: &[PortMapping],
        volumes: &[VolumeMapping],
        replace: bool,
    ) -> impl Future<Output = Result<String>> + Send;

    fn stop_and_remove(&mut self, identity: &str) -> impl Future<Output = Result<()>> + Send;

    /// Tear down everything this driver created. Best-effort.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
