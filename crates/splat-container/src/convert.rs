//! Conversion from splat mappings to Docker API parameters.

// Bollard 0.19 keeps the old options structs behind deprecation warnings.
#![allow(deprecated)]

use bollard::container::{Config, CreateContainerOptions};
use bollard::models::{HostConfig, PortBinding};
use splat_core::{PortMapping, VolumeMapping};
use std::collections::HashMap;

/// Build the create-container request for one app.
pub fn container_config(
    identity: &str,
    image: &str,
    ports: &[PortMapping],
    volumes: &[VolumeMapping],
) -> (Config<String>, CreateContainerOptions<String>) {
    let mut exposed_ports = HashMap::new();
    let mut port_bindings = HashMap::new();

    for mapping in ports {
        let key = mapping.container_key();
        exposed_ports.insert(key.clone(), HashMap::new());
        port_bindings.insert(
            key,
            Some(vec![PortBinding {
                host_ip: Some(mapping.host_addr.clone()),
                host_port: Some(mapping.host_port.to_string()),
            }]),
        );
    }

    let binds: Vec<String> = volumes.iter().map(|v| v.bind()).collect();

    let host_config = Some(HostConfig {
        port_bindings: Some(port_bindings),
        binds: Some(binds),
        ..Default::default()
    });

    let mut labels = HashMap::new();
    labels.insert("splat.managed".to_string(), "true".to_string());
    labels.insert("splat.app".to_string(), identity.to_string());

    let config = Config {
        image: Some(image.to_string()),
        exposed_ports: Some(exposed_ports),
        host_config,
        labels: Some(labels),
        ..Default::default()
    };

    let options = CreateContainerOptions {
        name: identity.to_string(),
        platform: None,
    };

    (config, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use splat_core::{Protocol, VolumeSpec};
    use std::path::Path;

    #[test]
    fn test_container_config_basic() {
        let ports = vec![PortMapping::new(8080, 10000, "127.0.0.1")];
        let (config, options) = container_config("pagemail.prd", "pagemail:latest", &ports, &[]);

        assert_eq!(config.image, Some("pagemail:latest".to_string()));
        assert_eq!(options.name, "pagemail.prd");

        let exposed = config.exposed_ports.unwrap();
        assert!(exposed.contains_key("8080/tcp"));

        let bindings = config.host_config.unwrap().port_bindings.unwrap();
        let binding = bindings.get("8080/tcp").unwrap().as_ref().unwrap();
        assert_eq!(binding[0].host_port, Some("10000".to_string()));
        assert_eq!(binding[0].host_ip, Some("127.0.0.1".to_string()));
    }

    #[test]
    fn test_container_config_udp_port() {
        let ports = vec![PortMapping {
            container_port: 53,
            protocol: Protocol::Udp,
            host_port: 10053,
            host_addr: "0.0.0.0".to_string(),
        }];
        let (config, _) = container_config("dns.dev", "coredns:latest", &ports, &[]);

        assert!(config.exposed_ports.unwrap().contains_key("53/udp"));
    }

    #[test]
    fn test_container_config_volume_binds() {
        let spec = VolumeSpec {
            name: "data".to_string(),
            source: "data".into(),
        };
        let volume = VolumeMapping::resolve(&spec, Path::new("/srv/splat")).unwrap();
        let (config, _) = container_config("app.dev", "app:latest", &[], &[volume]);

        let binds = config.host_config.unwrap().binds.unwrap();
        assert_eq!(binds, vec!["/srv/splat/data:/var/splat/data:rw"]);
    }

    #[test]
    fn test_container_config_labels() {
        let (config, _) = container_config("app.dev", "app:latest", &[], &[]);
        let labels = config.labels.unwrap();

        assert_eq!(labels.get("splat.managed"), Some(&"true".to_string()));
        assert_eq!(labels.get("splat.app"), Some(&"app.dev".to_string()));
    }
}
