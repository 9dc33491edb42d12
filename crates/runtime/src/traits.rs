//! The narrow engine interface the core depends on.

use crate::error::RuntimeError;
use async_trait::async_trait;
use podhost_types::{ContainerSpec, Pod, PodId};
use std::str::FromStr;

/// Engine-reported container run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Removing => "removing",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
            ContainerStatus::Unknown => "unknown",
        }
    }
}

impl FromStr for ContainerStatus {
    type Err = std::convert::Infallible;

    /// Unrecognized engine states map to `Unknown` rather than failing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "removing" => ContainerStatus::Removing,
            "exited" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            _ => ContainerStatus::Unknown,
        })
    }
}

/// Result of inspecting a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerState {
    pub status: ContainerStatus,
    pub running: bool,
}

/// A container found by pod-id lookup. The id is optional because engine list
/// responses do not guarantee one; callers must treat its absence as an
/// inconsistency, not retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub id: Option<String>,
}

/// Options for tail-bounded log retrieval.
#[derive(Debug, Clone, Copy)]
pub struct LogOptions {
    pub tail: u32,
    pub stdout: bool,
    pub stderr: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            tail: 100,
            stdout: true,
            stderr: true,
        }
    }
}

/// Network and routing context for container creation.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    /// Container network to attach to.
    pub network: String,
    /// Base DNS domain for reverse-proxy routing labels.
    pub domain: String,
}

/// Engine control surface used by the reconciler and pod service.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a container for the pod from a resolved spec; returns the
    /// engine's container id. Does not start it.
    async fn create_container(
        &self,
        pod: &Pod,
        spec: &ContainerSpec,
        ctx: &RuntimeContext,
    ) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerState, RuntimeError>;

    /// The authoritative "does this pod have a container" lookup, by managed +
    /// pod-id labels. Stored container ids are never trusted for existence.
    async fn container_for_pod(&self, pod_id: &PodId)
        -> Result<Option<ContainerRef>, RuntimeError>;

    async fn container_logs(&self, id: &str, opts: &LogOptions) -> Result<String, RuntimeError>;
}
