//! Reverse proxy config synchronization.
//!
//! Renders one nginx server block per app, installs it into the proxy's
//! conf directory and asks nginx to reload. One [`ProxyManager`] is shared
//! by every app task; all state sits behind a single mutex so an install
//! can never race a reload from another app.

pub mod error;

pub use error::{ProxyError, Result};

use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const ROUTE_TEMPLATE: &str = r#"server {
    listen 80;
    server_name {{ external_host }};

    location / {
        proxy_pass {{ internal_url }};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
    }
}
"#;

/// Inputs to the route template: where traffic arrives and where the
/// container listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    pub external_host: String,
    pub internal_url: String,
}

impl ProxyRoute {
    pub fn new(external_host: impl Into<String>, internal_url: impl Into<String>) -> Self {
        Self {
            external_host: external_host.into(),
            internal_url: internal_url.into(),
        }
    }
}

struct ProxyState {
    tera: Tera,
    /// Files installed this run, removed again on close.
    installed: Vec<PathBuf>,
}

pub struct ProxyManager {
    conf_dir: PathBuf,
    reload_command: Vec<String>,
    state: Mutex<ProxyState>,
}

impl ProxyManager {
    pub fn new(conf_dir: impl Into<PathBuf>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
            reload_command: vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()],
            state: Mutex::new(ProxyState {
                tera: Tera::default(),
                installed: Vec::new(),
            }),
        }
    }

    /// Override the reload command (tests, non-nginx frontends).
    pub fn with_reload_command(mut self, command: Vec<String>) -> Self {
        self.reload_command = command;
        self
    }

    /// Render the route config for one app.
    pub async fn render(&self, route: &ProxyRoute) -> Result<Vec<u8>> {
        if route.external_host.is_empty() {
            return Err(ProxyError::Render("external host is empty".to_string()));
        }
        if route.internal_url.is_empty() {
            return Err(ProxyError::Render("internal url is empty".to_string()));
        }

        let mut context = Context::new();
        context.insert("external_host", &route.external_host);
        context.insert("internal_url", &route.internal_url);

        let mut state = self.state.lock().await;
        let rendered = state
            .tera
            .render_str(ROUTE_TEMPLATE, &context)
            .map_err(|e| ProxyError::Render(e.to_string()))?;
        Ok(rendered.into_bytes())
    }

    /// Write the rendered config as `splat.<identity>.conf` and record the
    /// path for cleanup. The identity carries name and environment, so
    /// distinct apps never collide.
    pub async fn install(&self, identity: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.conf_dir.join(format!("splat.{}.conf", identity));

        let mut state = self.state.lock().await;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| ProxyError::Install {
                path: path.clone(),
                message: e.to_string(),
            })?;
        state.installed.push(path.clone());
        debug!(identity, path = %path.display(), "installed proxy config");
        Ok(path)
    }

    /// Ask the proxy to pick up installed configs. A failure leaves the
    /// app's container untouched; the caller records the degraded state.
    pub async fn reload(&self) -> Result<()> {
        // Hold the lock so a reload can't overlap an in-flight install.
        let _state = self.state.lock().await;
        self.run_reload().await
    }

    /// Remove every installed file and reload once, restoring the proxy to
    /// its pre-orchestrator state. Best-effort.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        for path in state.installed.drain(..) {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "failed to remove proxy config");
            }
        }
        drop(state);

        if let Err(e) = self.reload().await {
            warn!(error = %e, "final proxy reload failed");
        }
    }

    /// Paths currently installed, in install order.
    pub async fn installed(&self) -> Vec<PathBuf> {
        self.state.lock().await.installed.clone()
    }

    pub fn conf_dir(&self) -> &Path {
        &self.conf_dir
    }

    async fn run_reload(&self) -> Result<()> {
        let Some((program, args)) = self.reload_command.split_first() else {
            // Empty command means reload is disabled.
            return Ok(());
        };

        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| ProxyError::Reload(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProxyError::Reload(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }
        debug!("proxy reloaded");
        Ok(())
    }
}
