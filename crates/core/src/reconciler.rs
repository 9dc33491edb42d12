//! Reconciliation engine.
//!
//! One pass walks every pod and converges its container toward the desired
//! status. Container existence is always established by a fresh label lookup
//! against the engine; the stored `container_id` is a cached observation,
//! never an input. A failure reconciling one pod becomes status and event
//! data for that pod and the pass moves on.

use crate::error::CoreError;
use podhost_adapters::{AdapterError, AdapterRegistry, AgentAdapter, LifecycleContext};
use podhost_runtime::{ContainerRuntime, ContainerStatus, RuntimeContext, RuntimeError};
use podhost_store::{ContainerIdUpdate, PodStore, ReconcilablePod, StoreError};
use podhost_types::{ActualStatus, DesiredStatus, EventType, PlatformContext, PodId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Why one pod failed to converge. The display strings end up in the pod's
/// status message and error event.
#[derive(Debug, Error)]
enum ReconcileError {
    #[error("Adapter not found: {0}")]
    AdapterNotFound(String),

    /// The engine listed a container for the pod but returned no id.
    #[error("Container id missing")]
    MissingContainerId,

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// One failed pod within a pass.
#[derive(Debug, Clone)]
pub struct ReconcileFailure {
    pub pod_id: PodId,
    pub error: String,
}

/// Outcome of a single reconcile pass.
#[derive(Debug, Default, Clone)]
pub struct ReconcileSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<ReconcileFailure>,
}

pub struct Reconciler {
    store: Arc<dyn PodStore>,
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<AdapterRegistry>,
    ctx: RuntimeContext,
    interval: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn PodStore>,
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<AdapterRegistry>,
        ctx: RuntimeContext,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            runtime,
            registry,
            ctx,
            interval,
        }
    }

    /// Runs the reconcile loop: one pass immediately, then one per interval,
    /// until the shutdown signal flips. A pass that fails outright (the store
    /// is unreachable) is logged and the loop keeps going.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "reconciler started");
        self.run_pass().await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_pass().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reconciler stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn run_pass(&self) {
        match self.reconcile_once().await {
            Ok(summary) => self.log_pass(summary),
            Err(err) => error!(error = %err, "reconcile pass failed"),
        }
    }

    fn log_pass(&self, summary: ReconcileSummary) {
        if summary.failed > 0 {
            warn!(
                total = summary.total,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "reconcile pass finished with failures"
            );
        } else {
            debug!(total = summary.total, "reconcile pass finished");
        }
    }

    /// One full pass over every pod. Only a store failure loading the work
    /// list can fail the pass itself; per-pod errors are recorded on the pod.
    pub async fn reconcile_once(&self) -> Result<ReconcileSummary, CoreError> {
        let pods = self.store.list_reconcilable().await?;
        let mut summary = ReconcileSummary {
            total: pods.len(),
            ..Default::default()
        };

        for entry in pods {
            let pod_id = entry.pod.id;
            match self.reconcile_pod(&entry).await {
                Ok(()) => summary.succeeded += 1,
                Err(err) => {
                    let message = err.to_string();
                    error!(pod_id = %pod_id, error = %message, "pod reconcile failed");
                    self.record_failure(&pod_id, &message).await;
                    summary.failed += 1;
                    summary.failures.push(ReconcileFailure {
                        pod_id,
                        error: message,
                    });
                }
            }
        }
        Ok(summary)
    }

    /// A failed observation write must not abort the pass either.
    async fn record_failure(&self, pod_id: &PodId, message: &str) {
        let write = self
            .store
            .write_observation(pod_id, ActualStatus::Error, ContainerIdUpdate::Keep, Some(message))
            .await;
        if let Err(err) = write {
            warn!(pod_id = %pod_id, error = %err, "failed to record error status");
            return;
        }
        if let Err(err) = self
            .store
            .append_event(pod_id, EventType::Error, Some(message))
            .await
        {
            warn!(pod_id = %pod_id, error = %err, "failed to record error event");
        }
    }

    async fn reconcile_pod(&self, entry: &ReconcilablePod) -> Result<(), ReconcileError> {
        let pod = &entry.pod;
        // An unresolvable adapter fails the pod before the engine is touched,
        // whatever the desired status.
        let adapter = self
            .registry
            .get(&pod.adapter_id)
            .ok_or_else(|| ReconcileError::AdapterNotFound(pod.adapter_id.clone()))?;
        let existing = self.runtime.container_for_pod(&pod.id).await?;

        match pod.desired_status {
            DesiredStatus::Running => match existing {
                None => self.create_and_start(entry, adapter.as_ref()).await,
                Some(found) => {
                    let container_id = found.id.ok_or(ReconcileError::MissingContainerId)?;
                    self.ensure_running(&pod.id, &container_id).await
                }
            },
            DesiredStatus::Stopped => match existing {
                None => {
                    self.store
                        .write_observation(
                            &pod.id,
                            ActualStatus::Stopped,
                            ContainerIdUpdate::Clear,
                            None,
                        )
                        .await?;
                    Ok(())
                }
                Some(found) => {
                    let container_id = found.id.ok_or(ReconcileError::MissingContainerId)?;
                    self.ensure_stopped(&pod.id, &container_id).await
                }
            },
            DesiredStatus::Deleted => self.tear_down(entry, adapter.as_ref(), existing).await,
        }
    }

    /// No container exists: resolve the spec through the adapter, create, and
    /// start.
    async fn create_and_start(
        &self,
        entry: &ReconcilablePod,
        adapter: &dyn AgentAdapter,
    ) -> Result<(), ReconcileError> {
        let pod = &entry.pod;
        let config = entry.config.clone().unwrap_or_default();
        let platform = PlatformContext::new(self.ctx.domain.clone(), pod.data_dir.clone());
        let spec = adapter.resolve_container_spec(&config, &platform)?;

        let container_id = self.runtime.create_container(pod, &spec, &self.ctx).await?;
        self.store
            .append_event(
                &pod.id,
                EventType::Created,
                Some(&format!("Container created: {container_id}")),
            )
            .await?;

        self.runtime.start_container(&container_id).await?;
        self.store
            .write_observation(
                &pod.id,
                ActualStatus::Running,
                ContainerIdUpdate::Set(container_id),
                Some("Container started"),
            )
            .await?;
        self.store
            .append_event(&pod.id, EventType::Started, Some("Container started"))
            .await?;
        info!(pod_id = %pod.id, "container created and started");
        Ok(())
    }

    /// A container exists: start it if needed, refresh the observation either
    /// way. The steady state writes no events.
    async fn ensure_running(&self, pod_id: &PodId, container_id: &str) -> Result<(), ReconcileError> {
        let state = self.runtime.inspect_container(container_id).await?;
        if state.running {
            self.store
                .write_observation(
                    pod_id,
                    ActualStatus::Running,
                    ContainerIdUpdate::Set(container_id.to_string()),
                    Some("Container running"),
                )
                .await?;
            return Ok(());
        }

        self.runtime.start_container(container_id).await?;
        let message = format!(
            "Container transitioned from {} to running",
            state.status.as_str()
        );
        self.store
            .write_observation(
                pod_id,
                ActualStatus::Running,
                ContainerIdUpdate::Set(container_id.to_string()),
                Some(&message),
            )
            .await?;
        // An exited container coming back is a restart; anything else is a
        // plain start.
        let event_type = if state.status == ContainerStatus::Exited {
            EventType::Restarted
        } else {
            EventType::Started
        };
        self.store
            .append_event(pod_id, event_type, Some(&message))
            .await?;
        info!(pod_id = %pod_id, from = state.status.as_str(), "container started");
        Ok(())
    }

    async fn ensure_stopped(&self, pod_id: &PodId, container_id: &str) -> Result<(), ReconcileError> {
        let state = self.runtime.inspect_container(container_id).await?;
        if !state.running {
            self.store
                .write_observation(
                    pod_id,
                    ActualStatus::Stopped,
                    ContainerIdUpdate::Set(container_id.to_string()),
                    None,
                )
                .await?;
            return Ok(());
        }

        self.runtime.stop_container(container_id).await?;
        self.store
            .write_observation(
                pod_id,
                ActualStatus::Stopped,
                ContainerIdUpdate::Set(container_id.to_string()),
                Some("Container stopped by reconciler"),
            )
            .await?;
        self.store
            .append_event(pod_id, EventType::Stopped, Some("Container stopped by reconciler"))
            .await?;
        info!(pod_id = %pod_id, "container stopped");
        Ok(())
    }

    /// Removes the container of a pod marked for deletion. The record, data
    /// directory, and event history all stay; the pod converges to a stopped
    /// observation with no container id.
    async fn tear_down(
        &self,
        entry: &ReconcilablePod,
        adapter: &dyn AgentAdapter,
        existing: Option<podhost_runtime::ContainerRef>,
    ) -> Result<(), ReconcileError> {
        let pod = &entry.pod;

        match existing {
            Some(found) => {
                let container_id = found.id.ok_or(ReconcileError::MissingContainerId)?;

                // The hook gets a chance before the container disappears. A
                // hook failure aborts teardown; the next pass retries.
                let config = entry.config.clone().unwrap_or_default();
                let platform = PlatformContext::new(self.ctx.domain.clone(), pod.data_dir.clone());
                adapter
                    .on_before_delete(LifecycleContext {
                        pod,
                        config: &config,
                        platform: &platform,
                    })
                    .await?;

                let state = self.runtime.inspect_container(&container_id).await?;
                if state.running {
                    self.runtime.stop_container(&container_id).await?;
                }
                self.runtime.remove_container(&container_id, true).await?;
                self.store
                    .write_observation(
                        &pod.id,
                        ActualStatus::Stopped,
                        ContainerIdUpdate::Clear,
                        Some("Container removed by reconciler"),
                    )
                    .await?;
                self.store
                    .append_event(
                        &pod.id,
                        EventType::Deleted,
                        Some("Container removed by reconciler"),
                    )
                    .await?;
                info!(pod_id = %pod.id, "container removed");
            }
            None => {
                self.store
                    .write_observation(
                        &pod.id,
                        ActualStatus::Stopped,
                        ContainerIdUpdate::Clear,
                        None,
                    )
                    .await?;
            }
        }
        Ok(())
    }
}
