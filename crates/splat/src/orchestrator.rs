//! Orchestration controller.
//!
//! Composes the port allocator, the per-app container drivers and the
//! shared proxy manager into concurrent startup and shutdown flows. One
//! task runs per app; a failing app degrades itself, never its siblings.

use crate::registry::Registry;
use splat_container::{ContainerDriver, ContainerError, Engine};
use splat_core::{AppConfig, CoreError, PortAllocator, PortMapping, VolumeMapping};
use splat_proxy::{ProxyError, ProxyManager, ProxyRoute};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum OrchestrateError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("step '{step}' for '{identity}' timed out after {seconds}s")]
    Timeout {
        step: &'static str,
        identity: String,
        seconds: u64,
    },
}

pub struct OrchestratorOptions {
    /// Nginx conf.d directory the proxy manager installs into.
    pub nginx_dir: PathBuf,
    /// Host root all volume sources must resolve under.
    pub volume_root: PathBuf,
    /// Directory for per-app engine and container logs, if any.
    pub log_dir: Option<PathBuf>,
    pub port_base: u16,
    /// Loopback address containers bind to and routes point at.
    pub bind_addr: String,
    /// ECR login token from the environment, if the fleet pulls remotely.
    pub registry_token: Option<String>,
    /// Bound on each blocking engine step so one stuck app cannot stall
    /// the startup barrier forever.
    pub step_timeout: Duration,
    /// Override for the proxy reload command (tests).
    pub reload_command: Option<Vec<String>>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            nginx_dir: PathBuf::from("/etc/nginx/conf.d"),
            volume_root: PathBuf::from("/srv/splat"),
            log_dir: None,
            port_base: splat_core::DEFAULT_PORT_BASE,
            bind_addr: "127.0.0.1".to_string(),
            registry_token: None,
            step_timeout: Duration::from_secs(300),
            reload_command: None,
        }
    }
}

struct StartupOutcome {
    container_id: String,
    port: u16,
    /// Set when the container is up but the proxy reload failed.
    degraded: Option<String>,
}

pub struct Orchestrator<D: ContainerDriver = Engine> {
    registry: Registry<D>,
    ports: PortAllocator,
    proxy: ProxyManager,
    opts: OrchestratorOptions,
    /// Builds one driver per registered app.
    driver_factory: Box<dyn Fn(&AppConfig) -> D + Send + Sync>,
    shut_down: AtomicBool,
}

impl Orchestrator<Engine> {
    pub fn new(docker: bollard::Docker, opts: OrchestratorOptions) -> Self {
        let log_dir = opts.log_dir.clone();
        Self::with_driver(opts, move |config: &AppConfig| {
            let mut engine = Engine::new(docker.clone(), config.container_name());
            if let Some(dir) = &log_dir {
                engine = engine.with_log_dir(dir);
            }
            engine
        })
    }
}

impl<D: ContainerDriver> Orchestrator<D> {
    /// Build a controller with an explicit driver factory. [`new`] wires
    /// in the bollard engine; tests substitute their own drivers here.
    ///
    /// [`new`]: Orchestrator::new
    pub fn with_driver(
        opts: OrchestratorOptions,
        factory: impl Fn(&AppConfig) -> D + Send + Sync + 'static,
    ) -> Self {
        let mut proxy = ProxyManager::new(&opts.nginx_dir);
        if let Some(command) = &opts.reload_command {
            proxy = proxy.with_reload_command(command.clone());
        }

        Self {
            registry: Registry::new(),
            ports: PortAllocator::new(opts.port_base),
            proxy,
            opts,
            driver_factory: Box::new(factory),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Registry<D> {
        &self.registry
    }

    /// Register every app and fan out one startup task per uid. Blocks
    /// until all tasks finish and returns the per-uid failures; an empty
    /// map means the whole fleet came up.
    pub async fn start_fleet(
        self: &Arc<Self>,
        configs: Vec<AppConfig>,
    ) -> HashMap<String, OrchestrateError> {
        let mut uids = Vec::with_capacity(configs.len());
        for config in configs {
            let engine = (self.driver_factory)(&config);
            let uid = self.registry.register(config, engine);
            info!(uid = %uid, "registered app");
            uids.push(uid);
        }

        let mut tasks = JoinSet::new();
        for uid in uids {
            let orchestrator = Arc::clone(self);
            tasks.spawn(async move {
                let result = orchestrator.start_app(&uid).await;
                (uid, result)
            });
        }

        let mut failures = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((uid, Ok(()))) => info!(uid = %uid, "app running"),
                Ok((uid, Err(e))) => {
                    error!(uid = %uid, error = %e, "app failed to start");
                    failures.insert(uid, e);
                }
                Err(e) => error!(error = %e, "startup task aborted"),
            }
        }
        failures
    }

    /// Drive one app through its startup sequence, writing the outcome
    /// back to the registry.
    async fn start_app(&self, uid: &str) -> Result<(), OrchestrateError> {
        // Claim the driver so the process lock is never held across a
        // blocking runtime call; status dumps stay responsive mid-pull.
        let (config, engine) = self
            .registry
            .update(uid, |process| {
                process.mark_starting();
                (process.config.clone(), process.engine.take())
            })
            .await?;
        let mut engine = engine.ok_or_else(|| CoreError::ProcessNotFound(uid.to_string()))?;

        let result = self.run_startup(uid, &config, &mut engine).await;

        self.registry
            .update(uid, |process| {
                process.engine = Some(engine);
                match &result {
                    Ok(outcome) => {
                        process.container_id = Some(outcome.container_id.clone());
                        process.port = Some(outcome.port);
                        if let Some(degraded) = &outcome.degraded {
                            process.record_error(degraded);
                        }
                        process.mark_running();
                    }
                    Err(e) => process.mark_failed(e),
                }
            })
            .await?;

        result.map(|_| ())
    }

    /// The strictly ordered per-app startup steps. Aborts on the first
    /// failure, except a proxy reload failure which leaves the app
    /// degraded but still starts its container.
    async fn run_startup(
        &self,
        uid: &str,
        config: &AppConfig,
        engine: &mut D,
    ) -> Result<StartupOutcome, OrchestrateError> {
        let identity = config.container_name();

        if let Some(registry_addr) = &config.container.registry {
            engine.authenticate(self.opts.registry_token.as_deref(), registry_addr)?;
            self.bounded(
                "pull",
                &identity,
                engine.pull_image(&config.container.repo_path(), &config.container.tag),
            )
            .await??;
        }

        let port = self.ports.next()?;
        info!(uid = %uid, port, "allocated host port");

        let mut volumes = Vec::with_capacity(config.volumes.len());
        for spec in &config.volumes {
            volumes.push(VolumeMapping::resolve(spec, &self.opts.volume_root)?);
        }

        let route = ProxyRoute::new(
            &config.net.external_host,
            format!("http://{}:{}", self.opts.bind_addr, port),
        );
        let rendered = self.proxy.render(&route).await?;
        self.proxy.install(&identity, &rendered).await?;
        let degraded = match self.proxy.reload().await {
            Ok(()) => None,
            Err(e) => {
                warn!(uid = %uid, error = %e, "proxy reload failed; route not live");
                Some(e.to_string())
            }
        };

        let ports = vec![PortMapping::new(
            config.net.container_port,
            port,
            self.opts.bind_addr.clone(),
        )];
        let container_id = self
            .bounded(
                "start",
                &identity,
                engine.create_and_start(
                    &identity,
                    &config.container.full_name(),
                    &ports,
                    &volumes,
                    true,
                ),
            )
            .await??;

        Ok(StartupOutcome {
            container_id,
            port,
            degraded,
        })
    }

    /// Tear down the whole fleet, best-effort, then close the proxy.
    /// Idempotent: repeated termination requests stop each container at
    /// most once.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            info!("shutdown already in progress");
            return;
        }
        info!("shutting down fleet");

        for entry in self.registry.drain() {
            let mut process = entry.lock().await;
            if let Some(mut engine) = process.engine.take() {
                engine.close().await;
            }
            process.mark_stopped();
            info!(uid = %process.uid, "stopped");
        }

        self.proxy.close().await;
        info!("shutdown complete");
    }

    /// Log one line per registry entry: the operator-facing status dump.
    pub async fn status_dump(&self) {
        let snapshot = self.registry.snapshot().await;
        info!(processes = snapshot.len(), "status dump");
        for process in snapshot {
            info!(
                uid = %process.uid,
                container = process.container_id.as_deref().unwrap_or("-"),
                port = process.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                status = %process.status,
                error = process.last_error.as_deref().unwrap_or("-"),
                "process"
            );
        }
    }

    async fn bounded<T>(
        &self,
        step: &'static str,
        identity: &str,
        fut: impl std::future::Future<Output = T>,
    ) -> Result<T, OrchestrateError> {
        tokio::time::timeout(self.opts.step_timeout, fut)
            .await
            .map_err(|_| OrchestrateError::Timeout {
                step,
                identity: identity.to_string(),
                seconds: self.opts.step_timeout.as_secs(),
            })
    }
}
