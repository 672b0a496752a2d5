//! Per-app container lifecycle driver.
//!
//! One [`Engine`] is built per app so that a misbehaving container, pull or
//! log stream only ever takes down its own app. All engines share one
//! cloned [`bollard::Docker`] handle, which multiplexes over a single
//! daemon connection.

// Bollard 0.19 keeps the old options structs behind deprecation warnings.
#![allow(deprecated)]

use crate::convert::container_config;
use crate::driver::ContainerDriver;
use crate::error::{ContainerError, Result};
use bollard::auth::DockerCredentials;
use bollard::Docker;
use futures_util::StreamExt;
use splat_core::{PortMapping, VolumeMapping};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Username the ECR token authenticates as.
const ECR_USERNAME: &str = "AWS";

/// Grace period before a stop escalates to a kill, in seconds.
const STOP_GRACE_SECS: i64 = 10;

pub struct Engine {
    docker: Docker,
    app_name: String,
    credentials: Option<DockerCredentials>,
    /// Identities of containers this engine created, torn down on close.
    created: Vec<String>,
    log_dir: Option<PathBuf>,
    /// Log-follow tasks, aborted on close so one app's capture never
    /// outlives its driver.
    log_tasks: Vec<JoinHandle<()>>,
}

/// Connect to the local daemon and verify it responds.
pub async fn connect() -> Result<Docker> {
    let docker = Docker::connect_with_local_defaults()
        .map_err(|e| ContainerError::ConnectionFailed(e.to_string()))?;
    docker
        .ping()
        .await
        .map_err(|e| ContainerError::ConnectionFailed(e.to_string()))?;
    Ok(docker)
}

/// Registry credentials from `~/.docker/config.json`, if the user has
/// logged in to this registry out of band.
pub fn docker_config_credentials(registry: &str) -> Option<DockerCredentials> {
    let home = std::env::var("HOME").ok()?;
    let config_path = format!("{}/.docker/config.json", home);
    let content = std::fs::read_to_string(&config_path).ok()?;
    let config: serde_json::Value = serde_json::from_str(&content).ok()?;

    let auths = config.get("auths")?.as_object()?;
    let auth_b64 = auths.get(registry)?.get("auth")?.as_str()?;

    use base64::Engine as _;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth_b64)
        .ok()?;
    let auth_str = String::from_utf8(decoded).ok()?;
    let (username, password) = auth_str.split_once(':')?;

    Some(DockerCredentials {
        username: Some(username.to_string()),
        password: Some(password.to_string()),
        serveraddress: Some(registry.to_string()),
        ..Default::default()
    })
}

impl Engine {
    pub fn new(docker: Docker, app_name: impl Into<String>) -> Self {
        Self {
            docker,
            app_name: app_name.into(),
            credentials: None,
            created: Vec::new(),
            log_dir: None,
            log_tasks: Vec::new(),
        }
    }

    /// Capture pull progress and container output under this directory,
    /// one pair of files per app.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Configure pull credentials for a remote registry. An explicit login
    /// token wins; otherwise fall back to whatever `docker login` left in
    /// the user's config.
    pub fn authenticate(&mut self, token: Option<&str>, registry: &str) -> Result<()> {
        self.credentials = match token {
            Some(token) if !token.is_empty() => Some(DockerCredentials {
                username: Some(ECR_USERNAME.to_string()),
                password: Some(token.to_string()),
                serveraddress: Some(registry.to_string()),
                ..Default::default()
            }),
            _ => Some(docker_config_credentials(registry).ok_or_else(|| {
                ContainerError::Auth {
                    registry: registry.to_string(),
                }
            })?),
        };
        Ok(())
    }

    /// Pull `repo:tag`, streaming progress to the engine log file.
    pub async fn pull_image(&mut self, repo: &str, tag: &str) -> Result<()> {
        let image = format!("{}:{}", repo, tag);
        debug!(app = %self.app_name, image = %image, "pulling image");

        let mut log = self.open_log("engine").await;

        let options = bollard::image::CreateImageOptions {
            from_image: repo,
            tag,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .create_image(Some(options), None, self.credentials.clone());

        while let Some(info) = stream.next().await {
            match info {
                Ok(info) => {
                    if let Some(status) = info.status {
                        let line = match info.progress {
                            Some(progress) => format!("{}: {}\n", status, progress),
                            None => format!("{}\n", status),
                        };
                        if let Some(log) = log.as_mut() {
                            let _ = log.write_all(line.as_bytes()).await;
                        }
                    }
                }
                Err(e) => {
                    return Err(ContainerError::Pull {
                        image,
                        message: e.to_string(),
                    });
                }
            }
        }

        debug!(app = %self.app_name, image = %image, "pull complete");
        Ok(())
    }

    /// Create and start a container under `identity`. With `replace`, any
    /// container already holding the identity is stopped and removed first,
    /// so at most one container is ever live per identity.
    pub async fn create_and_start(
        &mut self,
        identity: &str,
        image: &str,
        ports: &[PortMapping],
        volumes: &[VolumeMapping],
        replace: bool,
    ) -> Result<String> {
        if replace {
            self.stop_and_remove(identity).await?;
        }

        let (config, options) = container_config(identity, image, ports, volumes);

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| ContainerError::Create {
                identity: identity.to_string(),
                message: e.to_string(),
            })?;
        debug!(app = %self.app_name, id = %response.id, "created container");
        self.created.push(identity.to_string());

        self.docker
            .start_container(
                &response.id,
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
            .map_err(|e| ContainerError::Start {
                identity: identity.to_string(),
                message: e.to_string(),
            })?;
        debug!(app = %self.app_name, id = %response.id, "started container");

        self.follow_logs(&response.id).await;

        Ok(response.id)
    }

    /// Stop and remove whatever container holds `identity`. Idempotent: no
    /// matching container is success, as is one that already stopped.
    pub async fn stop_and_remove(&mut self, identity: &str) -> Result<()> {
        let mut filters = std::collections::HashMap::new();
        filters.insert("name".to_string(), vec![identity.to_string()]);

        let options = bollard::container::ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        let slash_name = format!("/{}", identity);
        let existing = containers.into_iter().find(|c| {
            c.names
                .as_ref()
                .is_some_and(|names| names.iter().any(|n| n == &slash_name))
        });

        let Some(existing) = existing else {
            debug!(app = %self.app_name, identity, "no existing container");
            return Ok(());
        };
        let id = existing.id.as_deref().unwrap_or(identity).to_string();
        debug!(app = %self.app_name, id = %id, "replacing existing container");

        match self
            .docker
            .stop_container(
                &id,
                Some(bollard::container::StopContainerOptions { t: STOP_GRACE_SECS }),
            )
            .await
        {
            Ok(_) => debug!(app = %self.app_name, id = %id, "stopped container"),
            // 304: already stopped, 404: gone underneath us
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304 | 404,
                ..
            }) => {}
            Err(e) => return Err(e.into()),
        }

        match self
            .docker
            .remove_container(
                &id,
                Some(bollard::container::RemoveContainerOptions {
                    v: false,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(_) => debug!(app = %self.app_name, id = %id, "removed container"),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    /// Tear down everything this engine created. Best-effort: failures are
    /// logged, remaining containers are still attempted.
    pub async fn close(&mut self) {
        for task in self.log_tasks.drain(..) {
            task.abort();
        }

        let identities: Vec<String> = self.created.drain(..).collect();
        for identity in identities {
            if let Err(e) = self.stop_and_remove(&identity).await {
                warn!(app = %self.app_name, identity = %identity, error = %e, "failed to tear down container");
            }
        }
    }

    /// Identities created by this engine so far.
    pub fn created(&self) -> &[String] {
        &self.created
    }

    async fn follow_logs(&mut self, container_id: &str) {
        let Some(mut log) = self.open_log("container").await else {
            return;
        };

        let docker = self.docker.clone();
        let container_id = container_id.to_string();
        let task = tokio::spawn(async move {
            let options = bollard::container::LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                ..Default::default()
            };
            let mut stream = docker.logs(&container_id, Some(options));
            while let Some(output) = stream.next().await {
                match output {
                    Ok(output) => {
                        let _ = log.write_all(&output.into_bytes()).await;
                    }
                    Err(_) => break,
                }
            }
        });
        self.log_tasks.push(task);
    }

    async fn open_log(&self, kind: &str) -> Option<tokio::fs::File> {
        let dir = self.log_dir.as_ref()?;
        let path = dir.join(format!("{}-{}.log", self.app_name, kind));
        match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(app = %self.app_name, path = %path.display(), error = %e, "cannot open log file");
                None
            }
        }
    }
}

impl ContainerDriver for Engine {
    fn authenticate(&mut self, token: Option<&str>, registry: &str) -> Result<()> {
        Engine::authenticate(self, token, registry)
    }

    async fn pull_image(&mut self, repo: &str, tag: &str) -> Result<()> {
        Engine::pull_image(self, repo, tag).await
    }

    async fn create_and_start(
        &mut self,
        identity: &str,
        image: &str,
        ports: &[PortMapping],
        volumes: &[VolumeMapping],
        replace: bool,
    ) -> Result<String> {
        Engine::create_and_start(self, identity, image, ports, volumes, replace).await
    }

    async fn stop_and_remove(&mut self, identity: &str) -> Result<()> {
        Engine::stop_and_remove(self, identity).await
    }

    async fn close(&mut self) {
        Engine::close(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Connecting with local defaults is lazy; no daemon is needed to build
    // an engine, only to drive it.
    fn engine() -> Engine {
        let docker = Docker::connect_with_local_defaults().unwrap();
        Engine::new(docker, "testapp")
    }

    #[test]
    fn test_authenticate_with_token() {
        let mut engine = engine();
        engine
            .authenticate(Some("token123"), "123.dkr.ecr.eu-west-2.amazonaws.com")
            .unwrap();

        let creds = engine.credentials.as_ref().unwrap();
        assert_eq!(creds.username.as_deref(), Some("AWS"));
        assert_eq!(creds.password.as_deref(), Some("token123"));
        assert_eq!(
            creds.serveraddress.as_deref(),
            Some("123.dkr.ecr.eu-west-2.amazonaws.com")
        );
    }

    #[test]
    fn test_authenticate_without_any_credentials() {
        let mut engine = engine();
        // No token and nothing in docker config for this registry.
        let err = engine
            .authenticate(None, "registry.invalid.example")
            .unwrap_err();
        assert!(matches!(err, ContainerError::Auth { .. }));
    }

    #[test]
    fn test_empty_token_treated_as_absent() {
        let mut engine = engine();
        let err = engine
            .authenticate(Some(""), "registry.invalid.example")
            .unwrap_err();
        assert!(matches!(err, ContainerError::Auth { .. }));
    }

    #[test]
    fn test_created_starts_empty() {
        let engine = engine();
        assert!(engine.created().is_empty());
    }
}
