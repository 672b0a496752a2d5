//! In-memory process registry.
//!
//! Owns every [`Process`] in the fleet. The outer map lock is only taken
//! for structural operations (register, snapshot, drain); each entry sits
//! behind its own async mutex so updates to different uids never contend.

use splat_core::{generate_uid, AppConfig, CoreError, ProcessInfo, ProcessStatus};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

/// One managed app instance, generic over its container driver. Mutated
/// only by the controller task that owns its uid.
pub struct Process<D> {
    pub uid: String,
    pub config: AppConfig,
    /// Taken out while a startup task drives it, and at teardown. `Some`
    /// means no task currently holds the driver.
    pub engine: Option<D>,
    pub container_id: Option<String>,
    pub port: Option<u16>,
    pub status: ProcessStatus,
    pub last_error: Option<String>,
}

impl<D> Process<D> {
    fn new(uid: String, config: AppConfig, engine: D) -> Self {
        Self {
            uid,
            config,
            engine: Some(engine),
            container_id: None,
            port: None,
            status: ProcessStatus::Unknown,
            last_error: None,
        }
    }

    /// Begin a fresh startup attempt.
    pub fn mark_starting(&mut self) {
        self.status = ProcessStatus::Starting;
        self.last_error = None;
    }

    /// Promote to running. Only valid out of `Starting`: a failed process
    /// stays failed until a fresh attempt passes through `mark_starting`.
    pub fn mark_running(&mut self) {
        if self.status == ProcessStatus::Starting {
            self.status = ProcessStatus::Running;
        }
    }

    pub fn mark_failed(&mut self, error: impl ToString) {
        self.status = ProcessStatus::Failed;
        self.last_error = Some(error.to_string());
    }

    pub fn mark_stopped(&mut self) {
        self.status = ProcessStatus::Stopped;
    }

    /// Record a non-fatal error without changing status (degraded app).
    pub fn record_error(&mut self, error: impl ToString) {
        self.last_error = Some(error.to_string());
    }

    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            uid: self.uid.clone(),
            container_name: self.config.container_name(),
            container_id: self.container_id.clone(),
            port: self.port,
            status: self.status,
            last_error: self.last_error.clone(),
        }
    }
}

pub struct Registry<D> {
    entries: RwLock<HashMap<String, Arc<Mutex<Process<D>>>>>,
}

impl<D> Default for Registry<D> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<D> Registry<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an app and hand back its uid. Uid suffixes are random;
    /// on the off chance of a collision a new one is generated rather
    /// than overwriting the existing process.
    pub fn register(&self, config: AppConfig, engine: D) -> String {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        let mut uid = generate_uid(&config.name, &config.environment);
        while entries.contains_key(&uid) {
            uid = generate_uid(&config.name, &config.environment);
        }

        let process = Process::new(uid.clone(), config, engine);
        entries.insert(uid.clone(), Arc::new(Mutex::new(process)));
        debug!(uid = %uid, "registered process");
        uid
    }

    pub fn get(&self, uid: &str) -> Option<Arc<Mutex<Process<D>>>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(uid).cloned()
    }

    /// Apply a mutation to exactly one process. Callers never hold two
    /// concurrent writers for the same uid.
    pub async fn update<T>(
        &self,
        uid: &str,
        f: impl FnOnce(&mut Process<D>) -> T,
    ) -> Result<T, CoreError> {
        let entry = self
            .get(uid)
            .ok_or_else(|| CoreError::ProcessNotFound(uid.to_string()))?;
        let mut process = entry.lock().await;
        Ok(f(&mut process))
    }

    /// Point-in-time copy of every process, ordered by uid. Safe to call
    /// while startup tasks are writing.
    pub async fn snapshot(&self) -> Vec<ProcessInfo> {
        let handles: Vec<Arc<Mutex<Process<D>>>> = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.values().cloned().collect()
        };

        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            infos.push(handle.lock().await.info());
        }
        infos.sort_by(|a, b| a.uid.cmp(&b.uid));
        infos
    }

    /// Remove and return every entry, for shutdown iteration.
    pub fn drain(&self) -> Vec<Arc<Mutex<Process<D>>>> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.drain().map(|(_, handle)| handle).collect()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splat_container::Engine;
    use splat_core::{ImageRef, NetConfig};

    fn app_config(name: &str) -> AppConfig {
        AppConfig {
            name: name.to_string(),
            environment: "dev".to_string(),
            container: ImageRef {
                registry: None,
                image: name.to_string(),
                tag: "latest".to_string(),
            },
            net: NetConfig {
                external_host: format!("{}.local", name),
                container_port: 8080,
            },
            volumes: vec![],
        }
    }

    fn engine(name: &str) -> Engine {
        let docker = bollard::Docker::connect_with_local_defaults().unwrap();
        Engine::new(docker, name)
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = Registry::new();
        let uid = registry.register(app_config("a"), engine("a"));

        assert!(uid.starts_with("a.dev."));
        let process = registry.get(&uid).unwrap();
        let process = process.lock().await;
        assert_eq!(process.status, ProcessStatus::Unknown);
        assert!(process.engine.is_some());
    }

    #[tokio::test]
    async fn test_update_unknown_uid_is_not_found() {
        let registry: Registry<Engine> = Registry::new();
        let err = registry
            .update("nope.dev.aaaaa", |p| p.mark_starting())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ProcessNotFound(_)));
    }

    #[tokio::test]
    async fn test_snapshot_is_ordered_copy() {
        let registry = Registry::new();
        let uid_b = registry.register(app_config("b"), engine("b"));
        let uid_a = registry.register(app_config("a"), engine("a"));

        registry
            .update(&uid_a, |p| {
                p.mark_starting();
                p.port = Some(10000);
            })
            .await
            .unwrap();

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        let mut uids: Vec<&str> = snapshot.iter().map(|i| i.uid.as_str()).collect();
        let sorted = {
            let mut s = uids.clone();
            s.sort();
            s
        };
        assert_eq!(uids, sorted);
        uids.retain(|u| *u == uid_a || *u == uid_b);
        assert_eq!(uids.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_is_not_promoted_without_fresh_attempt() {
        let registry = Registry::new();
        let uid = registry.register(app_config("a"), engine("a"));

        registry
            .update(&uid, |p| {
                p.mark_starting();
                p.mark_failed("boom");
            })
            .await
            .unwrap();

        // A stray mark_running after failure must not stick.
        registry.update(&uid, |p| p.mark_running()).await.unwrap();
        let status = registry.update(&uid, |p| p.status).await.unwrap();
        assert_eq!(status, ProcessStatus::Failed);

        // A fresh attempt does promote.
        registry
            .update(&uid, |p| {
                p.mark_starting();
                p.mark_running();
            })
            .await
            .unwrap();
        let status = registry.update(&uid, |p| p.status).await.unwrap();
        assert_eq!(status, ProcessStatus::Running);
    }

    #[tokio::test]
    async fn test_drain_empties_registry() {
        let registry = Registry::new();
        registry.register(app_config("a"), engine("a"));
        registry.register(app_config("b"), engine("b"));

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
        assert!(registry.drain().is_empty());
    }

    #[tokio::test]
    async fn test_same_app_registered_twice_gets_distinct_uids() {
        let registry = Registry::new();
        let first = registry.register(app_config("a"), engine("a"));
        let second = registry.register(app_config("a"), engine("a"));
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
    }
}
