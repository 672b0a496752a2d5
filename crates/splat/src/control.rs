//! Signal-driven control loop.
//!
//! Signals are translated into explicit commands at the process boundary
//! so the loop itself is testable without delivering real signals.

use crate::orchestrator::Orchestrator;
use splat_container::ContainerDriver;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Dump every registry entry to the log (SIGUSR1).
    StatusDump,
    /// Reload app definitions (SIGHUP). Accepted but currently a no-op.
    Reload,
    /// Graceful shutdown (SIGINT/SIGTERM). Safe to deliver repeatedly.
    Shutdown,
}

/// Consume commands until a shutdown request (or the channel closing),
/// then tear the fleet down.
pub async fn control_loop<D: ContainerDriver>(
    orchestrator: Arc<Orchestrator<D>>,
    mut commands: mpsc::Receiver<Command>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::StatusDump => orchestrator.status_dump().await,
            Command::Reload => {
                // TODO: reconverge against re-read definition files once
                // the intended reload semantics are decided.
                info!("reload requested; definition reload is not implemented");
            }
            Command::Shutdown => break,
        }
    }

    orchestrator.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::OrchestratorOptions;

    fn orchestrator(dir: &tempfile::TempDir) -> Arc<Orchestrator> {
        let docker = bollard::Docker::connect_with_local_defaults().unwrap();
        Arc::new(Orchestrator::new(
            docker,
            OrchestratorOptions {
                nginx_dir: dir.path().to_path_buf(),
                reload_command: Some(vec!["true".to_string()]),
                ..Default::default()
            },
        ))
    }

    #[tokio::test]
    async fn test_shutdown_command_ends_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(&dir);
        let (tx, rx) = mpsc::channel(8);

        let handle = tokio::spawn(control_loop(Arc::clone(&orchestrator), rx));
        tx.send(Command::StatusDump).await.unwrap();
        tx.send(Command::Reload).await.unwrap();
        tx.send(Command::Shutdown).await.unwrap();

        handle.await.unwrap();
        assert!(orchestrator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_closed_channel_counts_as_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(&dir);
        let (tx, rx) = mpsc::channel::<Command>(1);

        let handle = tokio::spawn(control_loop(Arc::clone(&orchestrator), rx));
        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_repeated_shutdown_commands_are_safe() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(&dir);
        let (tx, rx) = mpsc::channel(8);

        // Queue two shutdowns before the loop runs; the second lands after
        // the loop exits and must not wedge anything.
        tx.send(Command::Shutdown).await.unwrap();
        let _ = tx.send(Command::Shutdown).await;

        control_loop(Arc::clone(&orchestrator), rx).await;
        orchestrator.shutdown().await;
    }
}
