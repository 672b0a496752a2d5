//! Port mapping between a container and the host.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// One container-port-to-host-port binding. Built fresh for every startup
/// attempt; never stored in the definition file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: Protocol,
    pub host_port: u16,
    pub host_addr: String,
}

impl PortMapping {
    pub fn new(container_port: u16, host_port: u16, host_addr: impl Into<String>) -> Self {
        Self {
            container_port,
            protocol: Protocol::Tcp,
            host_port,
            host_addr: host_addr.into(),
        }
    }

    /// Key in the Docker API port maps, e.g. `8080/tcp`.
    pub fn container_key(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_key() {
        let mapping = PortMapping::new(8080, 10000, "127.0.0.1");
        assert_eq!(mapping.container_key(), "8080/tcp");
        assert_eq!(mapping.protocol, Protocol::Tcp);
    }

    #[test]
    fn test_udp_key() {
        let mapping = PortMapping {
            container_port: 53,
            protocol: Protocol::Udp,
            host_port: 10053,
            host_addr: "0.0.0.0".to_string(),
        };
        assert_eq!(mapping.container_key(), "53/udp");
    }
}
