//! End-to-end reconciliation behavior against the in-memory store and a fake
//! container engine.

mod common;

use async_trait::async_trait;
use chrono::Utc;
use common::{harness, harness_with_adapters};
use podhost_adapters::{
    AdapterCategory, AdapterError, AdapterMeta, AgentAdapter, ConfigSchema, LifecycleContext,
};
use podhost_core::CreatePodRequest;
use podhost_runtime::ContainerRuntime;
use podhost_store::PodStore;
use podhost_types::{
    ActualStatus, ContainerSpec, DesiredStatus, EventType, HealthCheckSpec, PlatformContext, Pod,
    PodId, PortProtocol, PortSpec, ResourceSpec, RestartPolicy,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::test]
async fn converges_new_pod_to_running() {
    let h = harness().await;
    let pod = h.create_pod("Support Bot").await;

    let summary = h.reconciler.reconcile_once().await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);

    let detail = h.store.get_pod(&pod.id).await.unwrap().unwrap();
    assert_eq!(detail.pod.actual_status, ActualStatus::Running);
    assert_eq!(
        detail.pod.container_id,
        h.runtime.container_id(&pod.id)
    );
    let status = detail.status.unwrap();
    assert!(status.ready);
    assert_eq!(status.phase, "running");

    let events = h.store.list_events(&pod.id, 10).await.unwrap();
    let kinds: Vec<_> = events.iter().rev().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![EventType::Created, EventType::Created, EventType::Started]
    );
    assert!(events
        .iter()
        .any(|e| e.message.as_deref() == Some("Container started")));
    assert!(events.iter().any(|e| e
        .message
        .as_deref()
        .is_some_and(|m| m.starts_with("Container created: "))));
}

#[tokio::test]
async fn steady_state_pass_writes_no_events() {
    let h = harness().await;
    let pod = h.create_pod("Support Bot").await;

    h.reconciler.reconcile_once().await.unwrap();
    let events_before = h.store.list_events(&pod.id, 50).await.unwrap();
    let container_before = h.runtime.container_id(&pod.id);

    let summary = h.reconciler.reconcile_once().await.unwrap();
    assert_eq!(summary.succeeded, 1);

    let events_after = h.store.list_events(&pod.id, 50).await.unwrap();
    assert_eq!(events_before.len(), events_after.len());
    assert_eq!(h.runtime.container_id(&pod.id), container_before);

    let detail = h.store.get_pod(&pod.id).await.unwrap().unwrap();
    assert_eq!(detail.pod.actual_status, ActualStatus::Running);
}

#[tokio::test]
async fn stop_then_start_reuses_the_container() {
    let h = harness().await;
    let pod = h.create_pod("Support Bot").await;
    h.reconciler.reconcile_once().await.unwrap();
    let original_container = h.runtime.container_id(&pod.id).unwrap();

    h.service.stop(&pod.id).await.unwrap();
    h.reconciler.reconcile_once().await.unwrap();

    let detail = h.store.get_pod(&pod.id).await.unwrap().unwrap();
    assert_eq!(detail.pod.actual_status, ActualStatus::Stopped);
    assert!(!h.runtime.is_running(&pod.id));
    let events = h.store.list_events(&pod.id, 50).await.unwrap();
    assert!(events
        .iter()
        .any(|e| e.message.as_deref() == Some("Container stopped by reconciler")));

    h.service.start(&pod.id).await.unwrap();
    h.reconciler.reconcile_once().await.unwrap();

    // The exited container is restarted, not recreated.
    assert_eq!(h.runtime.container_id(&pod.id).unwrap(), original_container);
    let events = h.store.list_events(&pod.id, 50).await.unwrap();
    let restart = events
        .iter()
        .find(|e| e.event_type == EventType::Restarted)
        .expect("restart event");
    assert_eq!(
        restart.message.as_deref(),
        Some("Container transitioned from exited to running")
    );
}

#[tokio::test]
async fn delete_tears_down_the_container_but_keeps_the_record() {
    let h = harness().await;
    let pod = h.create_pod("Support Bot").await;
    h.reconciler.reconcile_once().await.unwrap();
    assert!(h.runtime.has_container(&pod.id));

    h.service.delete(&pod.id).await.unwrap();
    let summary = h.reconciler.reconcile_once().await.unwrap();
    assert_eq!(summary.succeeded, 1);

    assert!(!h.runtime.has_container(&pod.id));
    let detail = h.store.get_pod(&pod.id).await.unwrap().unwrap();
    assert_eq!(detail.pod.desired_status, DesiredStatus::Deleted);
    assert_eq!(detail.pod.actual_status, ActualStatus::Stopped);
    assert_eq!(detail.pod.container_id, None);

    let events = h.store.list_events(&pod.id, 50).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == EventType::Deleted
        && e.message.as_deref() == Some("Container removed by reconciler")));

    // Further passes leave the retired pod alone.
    let events_before = events.len();
    let summary = h.reconciler.reconcile_once().await.unwrap();
    assert_eq!(summary.failed, 0);
    let events = h.store.list_events(&pod.id, 50).await.unwrap();
    assert_eq!(events.len(), events_before);
}

#[tokio::test]
async fn one_failing_pod_does_not_block_the_rest() {
    let h = harness().await;
    let healthy = h.create_pod("Healthy").await;
    let doomed = h.create_pod("Doomed").await;
    h.runtime.fail_create_for(doomed.id);

    let summary = h.reconciler.reconcile_once().await.unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].pod_id, doomed.id);

    let ok = h.store.get_pod(&healthy.id).await.unwrap().unwrap();
    assert_eq!(ok.pod.actual_status, ActualStatus::Running);

    let bad = h.store.get_pod(&doomed.id).await.unwrap().unwrap();
    assert_eq!(bad.pod.actual_status, ActualStatus::Error);
    assert!(bad
        .status
        .unwrap()
        .message
        .is_some_and(|m| m.contains("image pull failed")));
    let events = h.store.list_events(&doomed.id, 10).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == EventType::Error));
}

#[tokio::test]
async fn unknown_adapter_is_a_reconcile_failure() {
    let h = harness().await;
    let now = Utc::now();
    let pod = Pod {
        id: PodId::generate(),
        tenant_id: h.tenant.id,
        name: "Orphan".to_string(),
        adapter_id: "ghost".to_string(),
        subdomain: "orphan-000000".to_string(),
        desired_status: DesiredStatus::Running,
        actual_status: ActualStatus::Pending,
        container_id: None,
        gateway_token: "tok".to_string(),
        data_dir: format!("{}/orphan", h.data_root),
        created_at: now,
        updated_at: now,
    };
    h.store
        .insert_pod(&pod, "tok", &serde_json::Map::new())
        .await
        .unwrap();

    let summary = h.reconciler.reconcile_once().await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].error, "Adapter not found: ghost");

    let detail = h.store.get_pod(&pod.id).await.unwrap().unwrap();
    assert_eq!(detail.pod.actual_status, ActualStatus::Error);
    assert_eq!(
        detail.status.unwrap().message.as_deref(),
        Some("Adapter not found: ghost")
    );
}

#[tokio::test]
async fn container_without_id_is_a_reconcile_failure() {
    let h = harness().await;
    let pod = h.create_pod("Support Bot").await;
    h.reconciler.reconcile_once().await.unwrap();

    h.runtime.hide_container_id(pod.id);
    let summary = h.reconciler.reconcile_once().await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].error, "Container id missing");
}

#[tokio::test]
async fn desired_and_actual_change_hands_only_through_the_reconciler() {
    let h = harness().await;
    let pod = h.create_pod("Support Bot").await;
    h.reconciler.reconcile_once().await.unwrap();

    h.service.stop(&pod.id).await.unwrap();
    let detail = h.store.get_pod(&pod.id).await.unwrap().unwrap();
    assert_eq!(detail.pod.desired_status, DesiredStatus::Stopped);
    // Intent alone does not touch the observation.
    assert_eq!(detail.pod.actual_status, ActualStatus::Running);
    assert!(h.runtime.is_running(&pod.id));

    h.reconciler.reconcile_once().await.unwrap();
    let detail = h.store.get_pod(&pod.id).await.unwrap().unwrap();
    assert_eq!(detail.pod.actual_status, ActualStatus::Stopped);
}

#[tokio::test]
async fn stopped_pod_with_no_container_clears_the_cached_id() {
    let h = harness().await;
    let pod = h.create_pod("Support Bot").await;
    h.reconciler.reconcile_once().await.unwrap();

    // Container disappears out from under us.
    let container = h.runtime.container_id(&pod.id).unwrap();
    h.runtime.remove_container(&container, true).await.unwrap();

    h.service.stop(&pod.id).await.unwrap();
    h.reconciler.reconcile_once().await.unwrap();

    let detail = h.store.get_pod(&pod.id).await.unwrap().unwrap();
    assert_eq!(detail.pod.actual_status, ActualStatus::Stopped);
    assert_eq!(detail.pod.container_id, None);
}

#[tokio::test]
async fn unknown_adapter_fails_the_pod_whatever_the_desired_status() {
    let h = harness().await;
    let now = Utc::now();
    let pod = Pod {
        id: PodId::generate(),
        tenant_id: h.tenant.id,
        name: "Orphan".to_string(),
        adapter_id: "ghost".to_string(),
        subdomain: "orphan-111111".to_string(),
        desired_status: DesiredStatus::Stopped,
        actual_status: ActualStatus::Pending,
        container_id: None,
        gateway_token: "tok".to_string(),
        data_dir: format!("{}/orphan", h.data_root),
        created_at: now,
        updated_at: now,
    };
    h.store.insert_pod(&pod, "tok", &Map::new()).await.unwrap();

    // A stopped pod with no container would normally converge trivially; the
    // unresolvable adapter must still fail it.
    let summary = h.reconciler.reconcile_once().await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].error, "Adapter not found: ghost");

    let detail = h.store.get_pod(&pod.id).await.unwrap().unwrap();
    assert_eq!(detail.pod.actual_status, ActualStatus::Error);
}

/// Adapter whose pre-delete hook always refuses, for teardown-ordering tests.
struct VetoingAdapter {
    meta: AdapterMeta,
    spec: ContainerSpec,
    schema: ConfigSchema,
}

impl VetoingAdapter {
    fn new() -> Self {
        Self {
            meta: AdapterMeta {
                id: "veto".to_string(),
                label: "Veto".to_string(),
                description: "Refuses to be deleted".to_string(),
                version: "0.0.1".to_string(),
                category: AdapterCategory::Custom,
                tags: Vec::new(),
                logo: None,
            },
            spec: ContainerSpec {
                image: "busybox:latest".to_string(),
                command: None,
                environment: BTreeMap::new(),
                volumes: Vec::new(),
                ports: vec![PortSpec {
                    container: 8080,
                    protocol: PortProtocol::Tcp,
                    primary: true,
                    websocket: false,
                }],
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
            },
            schema: ConfigSchema::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AgentAdapter for VetoingAdapter {
    fn meta(&self) -> &AdapterMeta {
        &self.meta
    }

    fn container_spec(&self) -> &ContainerSpec {
        &self.spec
    }

    fn config_schema(&self) -> &ConfigSchema {
        &self.schema
    }

    async fn on_before_delete(&self, _ctx: LifecycleContext<'_>) -> Result<(), AdapterError> {
        Err(AdapterError::Hook("export still in progress".to_string()))
    }

    fn resolve_container_spec(
        &self,
        _config: &Map<String, Value>,
        _platform: &PlatformContext,
    ) -> Result<ContainerSpec, AdapterError> {
        Ok(self.spec.clone())
    }
}

#[tokio::test]
async fn failing_pre_delete_hook_defers_teardown() {
    let h = harness_with_adapters(vec![Arc::new(VetoingAdapter::new())]).await;
    let pod = h
        .service
        .create(CreatePodRequest {
            tenant_id: h.tenant.id,
            name: "Clingy".to_string(),
            adapter_id: "veto".to_string(),
            config: None,
        })
        .await
        .unwrap();
    h.reconciler.reconcile_once().await.unwrap();
    assert!(h.runtime.has_container(&pod.id));

    h.service.delete(&pod.id).await.unwrap();
    let summary = h.reconciler.reconcile_once().await.unwrap();
    assert_eq!(summary.failed, 1);
    assert!(summary.failures[0].error.contains("export still in progress"));

    // The container survives for the next pass to retry.
    assert!(h.runtime.has_container(&pod.id));
    let detail = h.store.get_pod(&pod.id).await.unwrap().unwrap();
    assert_eq!(detail.pod.actual_status, ActualStatus::Error);
}

#[tokio::test]
async fn delete_without_a_container_never_runs_the_hook() {
    let h = harness_with_adapters(vec![Arc::new(VetoingAdapter::new())]).await;
    let pod = h
        .service
        .create(CreatePodRequest {
            tenant_id: h.tenant.id,
            name: "Clingy".to_string(),
            adapter_id: "veto".to_string(),
            config: None,
        })
        .await
        .unwrap();

    // Deleted before any container was ever created: the vetoing hook is
    // irrelevant and the pod converges.
    h.service.delete(&pod.id).await.unwrap();
    let summary = h.reconciler.reconcile_once().await.unwrap();
    assert_eq!(summary.succeeded, 1);

    let detail = h.store.get_pod(&pod.id).await.unwrap().unwrap();
    assert_eq!(detail.pod.actual_status, ActualStatus::Stopped);
    assert_eq!(detail.pod.container_id, None);
}
