//! Declarative container spec.
//!
//! Adapters resolve one of these from a pod's validated config; the runtime
//! gateway translates it into engine-native create calls. All quantities here
//! are in human units (seconds, megabytes, fractional CPUs) — engine-native
//! unit conversion is the gateway's job.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Layer-4 protocol for an exposed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    Tcp,
    Udp,
}

impl PortProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortProtocol::Tcp => "tcp",
            PortProtocol::Udp => "udp",
        }
    }
}

/// A port exposed by the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub container: u16,
    pub protocol: PortProtocol,
    /// The port the reverse proxy routes to. At most one should be flagged.
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub websocket: bool,
}

/// A bind-mounted volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub container_path: String,
    pub source: String,
    pub persistent: bool,
}

/// Engine health check, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    pub command: Vec<String>,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub retries: u32,
    pub start_period_seconds: u64,
}

/// Resource limits in human units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub memory_mb: u64,
    pub cpus: f64,
}

/// Container restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    Always,
    OnFailure,
    UnlessStopped,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

/// Everything needed to create a pod's container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    pub ports: Vec<PortSpec>,
    pub health_check: HealthCheckSpec,
    pub resources: ResourceSpec,
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub user: Option<String>,
}

impl ContainerSpec {
    /// The port the reverse proxy should target: the first flagged primary,
    /// falling back to the first declared port.
    pub fn primary_port(&self) -> Option<u16> {
        self.ports
            .iter()
            .find(|p| p.primary)
            .or_else(|| self.ports.first())
            .map(|p| p.container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with_ports(ports: Vec<PortSpec>) -> ContainerSpec {
        ContainerSpec {
            image: "busybox:latest".to_string(),
            command: None,
            environment: BTreeMap::new(),
            volumes: Vec::new(),
            ports,
            health_check: HealthCheckSpec {
                command: vec!["CMD".to_string(), "true".to_string()],
                interval_seconds: 30,
                timeout_seconds: 10,
                retries: 3,
                start_period_seconds: 5,
            },
            resources: ResourceSpec {
                memory_mb: 128,
                cpus: 0.5,
            },
            restart_policy: RestartPolicy::UnlessStopped,
            user: None,
        }
    }

    #[test]
    fn primary_port_prefers_flagged() {
        let spec = spec_with_ports(vec![
            PortSpec {
                container: 8080,
                protocol: PortProtocol::Tcp,
                primary: false,
                websocket: false,
            },
            PortSpec {
                container: 9090,
                protocol: PortProtocol::Tcp,
                primary: true,
                websocket: false,
            },
        ]);
        assert_eq!(spec.primary_port(), Some(9090));
    }

    #[test]
    fn primary_port_falls_back_to_first() {
        let spec = spec_with_ports(vec![PortSpec {
            container: 8080,
            protocol: PortProtocol::Tcp,
            primary: false,
            websocket: false,
        }]);
        assert_eq!(spec.primary_port(), Some(8080));
    }

    #[test]
    fn primary_port_none_without_ports() {
        assert_eq!(spec_with_ports(Vec::new()).primary_port(), None);
    }
}
