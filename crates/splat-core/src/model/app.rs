//! Declarative application definition.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One application as loaded from its definition file. Immutable input to
/// the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub environment: String,
    pub container: ImageRef,
    pub net: NetConfig,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
}

/// Container image descriptor. `registry` is absent for images already
/// available to the local daemon; when present it names the remote registry
/// the image is pulled from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(rename = "ecr", default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    pub image: String,
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_tag() -> String {
    "latest".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfig {
    #[serde(rename = "external-host")]
    pub external_host: String,
    #[serde(rename = "container-port")]
    pub container_port: u16,
}

/// A volume request as written in the definition file, before source
/// resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    pub source: PathBuf,
}

impl AppConfig {
    /// Container identity: stable across restarts of the same app, shared
    /// by the container name and the installed proxy config.
    pub fn container_name(&self) -> String {
        format!("{}.{}", self.name, self.environment)
    }
}

impl ImageRef {
    /// Fully qualified image reference passed to the runtime.
    pub fn full_name(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}:{}", registry, self.image, self.tag),
            None => format!("{}:{}", self.image, self.tag),
        }
    }

    /// Repository path used for pulls, without the tag.
    pub fn repo_path(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry, self.image),
            None => self.image.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name() {
        let config = AppConfig {
            name: "pagemail".to_string(),
            environment: "prd".to_string(),
            container: ImageRef {
                registry: None,
                image: "pagemail".to_string(),
                tag: "latest".to_string(),
            },
            net: NetConfig {
                external_host: "pagemail.example.com".to_string(),
                container_port: 8080,
            },
            volumes: vec![],
        };

        assert_eq!(config.container_name(), "pagemail.prd");
    }

    #[test]
    fn test_image_full_name_local() {
        let image = ImageRef {
            registry: None,
            image: "nginx".to_string(),
            tag: "alpine".to_string(),
        };
        assert_eq!(image.full_name(), "nginx:alpine");
        assert_eq!(image.repo_path(), "nginx");
    }

    #[test]
    fn test_image_full_name_remote() {
        let image = ImageRef {
            registry: Some("123456789.dkr.ecr.eu-west-2.amazonaws.com".to_string()),
            image: "pagemail".to_string(),
            tag: "v2".to_string(),
        };
        assert_eq!(
            image.full_name(),
            "123456789.dkr.ecr.eu-west-2.amazonaws.com/pagemail:v2"
        );
        assert_eq!(
            image.repo_path(),
            "123456789.dkr.ecr.eu-west-2.amazonaws.com/pagemail"
        );
    }
}
