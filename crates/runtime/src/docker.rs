//! Docker implementation of the container runtime gateway.
//!
//! All engine-specific encoding lives here: management labels, Traefik routing
//! labels derived from the pod's subdomain, health-check translation from
//! seconds to nanoseconds, and resource limits from MB / fractional CPUs to
//! bytes / NanoCpus.

use crate::error::RuntimeError;
use crate::traits::{
    ContainerRef, ContainerRuntime, ContainerState, ContainerStatus, LogOptions, RuntimeContext,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogsOptions,
    NetworkingConfig, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::models::{EndpointSettings, HealthConfig, HostConfig, RestartPolicy as EngineRestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use futures_util::TryStreamExt;
use podhost_types::{ContainerSpec, Pod, PodId, RestartPolicy};
use std::collections::HashMap;

/// Label marking containers owned by this platform.
pub const LABEL_MANAGED: &str = "podhost.managed";
/// Label carrying the owning pod id.
pub const LABEL_POD_ID: &str = "podhost.pod-id";
/// Label carrying the adapter id, for operator tooling.
pub const LABEL_ADAPTER: &str = "podhost.adapter";

const NANOS_PER_SECOND: i64 = 1_000_000_000;

fn seconds_to_nanos(seconds: u64) -> i64 {
    seconds as i64 * NANOS_PER_SECOND
}

fn restart_policy_name(policy: RestartPolicy) -> RestartPolicyNameEnum {
    match policy {
        RestartPolicy::No => RestartPolicyNameEnum::NO,
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
    }
}

/// Reverse-proxy routing labels, fully derived from the pod so the proxy needs
/// no separate configuration store.
fn traefik_labels(
    pod: &Pod,
    network: &str,
    primary_port: u16,
    domain: &str,
) -> HashMap<String, String> {
    HashMap::from([
        ("traefik.enable".to_string(), "true".to_string()),
        ("traefik.docker.network".to_string(), network.to_string()),
        (
            format!("traefik.http.routers.{}.rule", pod.id),
            format!("Host(`{}.{}`)", pod.subdomain, domain),
        ),
        (
            format!("traefik.http.routers.{}.entrypoints", pod.id),
            "websecure".to_string(),
        ),
        (
            format!("traefik.http.routers.{}.tls.certresolver", pod.id),
            "letsencrypt".to_string(),
        ),
        (
            format!("traefik.http.services.{}.loadbalancer.server.port", pod.id),
            primary_port.to_string(),
        ),
    ])
}

/// Translate a pod + resolved spec into an engine create request.
///
/// Pure so it can be unit tested without a daemon. Fails when the spec has no
/// primary port: routing labels cannot be generated without one.
fn build_container_config(
    pod: &Pod,
    spec: &ContainerSpec,
    ctx: &RuntimeContext,
) -> Result<Config<String>, RuntimeError> {
    let primary_port = spec.primary_port().ok_or_else(|| {
        RuntimeError::InvalidSpec(format!("no container port defined for pod {}", pod.id))
    })?;

    let mut labels = HashMap::from([
        (LABEL_MANAGED.to_string(), "true".to_string()),
        (LABEL_POD_ID.to_string(), pod.id.to_string()),
        (LABEL_ADAPTER.to_string(), pod.adapter_id.clone()),
    ]);
    labels.extend(traefik_labels(pod, &ctx.network, primary_port, &ctx.domain));

    let env: Vec<String> = spec
        .environment
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
        .ports
        .iter()
        .map(|p| (format!("{}/{}", p.container, p.protocol.as_str()), HashMap::new()))
        .collect();

    let binds: Vec<String> = spec
        .volumes
        .iter()
        .map(|v| format!("{}:{}", v.source, v.container_path))
        .collect();

    Ok(Config {
        image: Some(spec.image.clone()),
        cmd: spec.command.clone(),
        env: Some(env),
        labels: Some(labels),
        user: spec.user.clone(),
        exposed_ports: Some(exposed_ports),
        healthcheck: Some(HealthConfig {
            test: Some(spec.health_check.command.clone()),
            interval: Some(seconds_to_nanos(spec.health_check.interval_seconds)),
            timeout: Some(seconds_to_nanos(spec.health_check.timeout_seconds)),
            retries: Some(spec.health_check.retries as i64),
            start_period: Some(seconds_to_nanos(spec.health_check.start_period_seconds)),
            ..Default::default()
        }),
        host_config: Some(HostConfig {
            binds: Some(binds),
            restart_policy: Some(EngineRestartPolicy {
                name: Some(restart_policy_name(spec.restart_policy)),
                maximum_retry_count: None,
            }),
            memory: Some(spec.resources.memory_mb as i64 * 1024 * 1024),
            nano_cpus: Some((spec.resources.cpus * NANOS_PER_SECOND as f64) as i64),
            ..Default::default()
        }),
        networking_config: Some(NetworkingConfig {
            endpoints_config: HashMap::from([(
                ctx.network.clone(),
                EndpointSettings::default(),
            )]),
        }),
        ..Default::default()
    })
}

/// Docker-backed [`ContainerRuntime`].
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the environment's default engine socket.
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Connection(e.to_string()))?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(
        &self,
        pod: &Pod,
        spec: &ContainerSpec,
        ctx: &RuntimeContext,
    ) -> Result<String, RuntimeError> {
        let config = build_container_config(pod, spec, ctx)?;
        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;
        tracing::debug!(pod_id = %pod.id, container_id = %response.id, "created container");
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker.stop_container(id, None::<StopContainerOptions>).await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerState, RuntimeError> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        let (status, running) = match response.state {
            Some(state) => (
                state
                    .status
                    .map(|s| s.to_string().parse().unwrap_or(ContainerStatus::Unknown))
                    .unwrap_or(ContainerStatus::Unknown),
                state.running.unwrap_or(false),
            ),
            None => (ContainerStatus::Unknown, false),
        };

        Ok(ContainerState { status, running })
    }

    async fn container_for_pod(
        &self,
        pod_id: &PodId,
    ) -> Result<Option<ContainerRef>, RuntimeError> {
        let filters = HashMap::from([(
            "label".to_string(),
            vec![
                format!("{LABEL_MANAGED}=true"),
                format!("{LABEL_POD_ID}={pod_id}"),
            ],
        )]);

        let mut containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        if containers.is_empty() {
            return Ok(None);
        }
        let summary = containers.remove(0);
        Ok(Some(ContainerRef { id: summary.id }))
    }

    async fn container_logs(&self, id: &str, opts: &LogOptions) -> Result<String, RuntimeError> {
        let chunks: Vec<_> = self
            .docker
            .logs(
                id,
                Some(LogsOptions::<String> {
                    stdout: opts.stdout,
                    stderr: opts.stderr,
                    tail: opts.tail.to_string(),
                    ..Default::default()
                }),
            )
            .try_collect()
            .await?;

        let mut out = String::new();
        for chunk in chunks {
            out.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
        }
        Ok(out)
    }
}
