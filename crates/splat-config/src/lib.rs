//! Application definition loader.
//!
//! One YAML file per app:
//!
//! ```yaml
//! name: pagemail
//! environment: prd
//! container:
//!   ecr: 123456789.dkr.ecr.eu-west-2.amazonaws.com   # optional
//!   image: pagemail
//!   tag: latest
//! net:
//!   external-host: pagemail.example.com
//!   container-port: 8080
//! volumes:
//!   - name: data
//!     source: pagemail/data
//! ```

pub mod error;

pub use error::{ConfigError, Result};

use splat_core::AppConfig;
use std::path::Path;
use tracing::debug;

/// Load and validate one app definition. A failure here is fatal to that
/// app only; the caller decides what it means for the fleet.
pub fn load(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let config: AppConfig = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    validate(&config, path)?;

    debug!(
        app = %config.name,
        environment = %config.environment,
        image = %config.container.full_name(),
        "loaded app definition"
    );
    Ok(config)
}

fn validate(config: &AppConfig, path: &Path) -> Result<()> {
    let invalid = |message: &str| ConfigError::Invalid {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    if config.name.is_empty() {
        return Err(invalid("'name' must not be empty"));
    }
    if config.environment.is_empty() {
        return Err(invalid("'environment' must not be empty"));
    }
    if config.container.image.is_empty() {
        return Err(invalid("'container.image' must not be empty"));
    }
    if config
        .container
        .registry
        .as_deref()
        .is_some_and(|r| r.is_empty())
    {
        return Err(invalid("'container.ecr' must not be empty when present"));
    }
    if config.net.external_host.is_empty() {
        return Err(invalid("'net.external-host' must not be empty"));
    }
    if config.net.container_port == 0 {
        return Err(invalid("'net.container-port' must be non-zero"));
    }
    for volume in &config.volumes {
        if volume.name.is_empty() {
            return Err(invalid("'volumes[].name' must not be empty"));
        }
        if volume.source.as_os_str().is_empty() {
            return Err(invalid("'volumes[].source' must not be empty"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_full_definition() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "pagemail.prd.yaml",
            r#"
name: pagemail
environment: prd
container:
  ecr: 123456789.dkr.ecr.eu-west-2.amazonaws.com
  image: pagemail
  tag: v2
net:
  external-host: pagemail.example.com
  container-port: 8080
volumes:
  - name: data
    source: pagemail/data
"#,
        );

        let config = load(&path).unwrap();
        assert_eq!(config.name, "pagemail");
        assert_eq!(config.environment, "prd");
        assert_eq!(
            config.container.registry.as_deref(),
            Some("123456789.dkr.ecr.eu-west-2.amazonaws.com")
        );
        assert_eq!(config.container.tag, "v2");
        assert_eq!(config.net.container_port, 8080);
        assert_eq!(config.volumes.len(), 1);
        assert_eq!(config.volumes[0].name, "data");
    }

    #[test]
    fn test_registry_and_volumes_are_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "example.dev.yaml",
            r#"
name: example
environment: dev
container:
  image: nginx
  tag: alpine
net:
  external-host: example.local
  container-port: 80
"#,
        );

        let config = load(&path).unwrap();
        assert!(config.container.registry.is_none());
        assert!(config.volumes.is_empty());
    }

    #[test]
    fn test_tag_defaults_to_latest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "app.yaml",
            r#"
name: app
environment: dev
container:
  image: app
net:
  external-host: app.local
  container-port: 3000
"#,
        );

        assert_eq!(load(&path).unwrap().container.tag, "latest");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_zero_port_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "bad.yaml",
            r#"
name: app
environment: dev
container:
  image: app
net:
  external-host: app.local
  container-port: 0
"#,
        );

        let err = load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "bad.yaml", "name: [unclosed");
        let err = load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
