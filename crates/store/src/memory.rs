//! In-memory store backend.
//!
//! Mirrors the PostgreSQL semantics closely enough that the reconciler and
//! services can run against it in tests and local development. A single lock
//! guards all tables so multi-table writes stay atomic, matching the
//! transactions the real backend uses.

use crate::error::StoreError;
use crate::traits::{ContainerIdUpdate, PodDetail, PodStore, PodWithStatus, ReconcilablePod};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use podhost_types::{
    ActualStatus, DesiredStatus, EventType, Pod, PodConfig, PodEvent, PodId, PodStatusRecord,
    Tenant, TenantId,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    tenants: HashMap<TenantId, Tenant>,
    pods: HashMap<PodId, Pod>,
    configs: HashMap<PodId, PodConfig>,
    statuses: HashMap<PodId, PodStatusRecord>,
    events: Vec<PodEvent>,
    next_event_id: i64,
}

impl Inner {
    fn push_event(&mut self, pod_id: PodId, event_type: EventType, message: Option<&str>) {
        self.next_event_id += 1;
        self.events.push(PodEvent {
            id: self.next_event_id,
            pod_id,
            event_type,
            message: message.map(str::to_string),
            created_at: Utc::now(),
        });
    }
}

/// Store backend holding everything in process memory.
#[derive(Default)]
pub struct InMemoryPodStore {
    inner: RwLock<Inner>,
}

impl InMemoryPodStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: pin a pod's status snapshot to a specific timestamp.
    pub async fn force_status_timestamp(&self, id: &PodId, at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        if let Some(status) = inner.statuses.get_mut(id) {
            status.updated_at = at;
        }
    }

    /// Test helper: the gateway token exactly as stored at rest.
    pub async fn raw_gateway_token(&self, id: &PodId) -> Option<String> {
        let inner = self.inner.read().await;
        inner.pods.get(id).map(|pod| pod.gateway_token.clone())
    }
}

#[async_trait]
impl PodStore for InMemoryPodStore {
    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let inner = self.inner.read().await;
        let mut tenants: Vec<_> = inner.tenants.values().cloned().collect();
        tenants.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tenants)
    }

    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.tenants.get(id).cloned())
    }

    async fn tenant_exists(&self, id: &TenantId) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.tenants.contains_key(id))
    }

    async fn delete_tenant(&self, id: &TenantId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.tenants.contains_key(id) {
            return Err(StoreError::NotFound {
                entity: "tenant",
                id: id.to_string(),
            });
        }
        if inner.pods.values().any(|pod| pod.tenant_id == *id) {
            return Err(StoreError::Conflict(format!("tenant {id} still has pods")));
        }
        inner.tenants.remove(id);
        Ok(())
    }

    async fn insert_pod(
        &self,
        pod: &Pod,
        stored_gateway_token: &str,
        config: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.pods.values().any(|p| p.subdomain == pod.subdomain) {
            return Err(StoreError::Conflict(format!(
                "subdomain already taken: {}",
                pod.subdomain
            )));
        }
        let mut stored = pod.clone();
        stored.gateway_token = stored_gateway_token.to_string();
        inner.pods.insert(pod.id, stored);
        inner.configs.insert(
            pod.id,
            PodConfig {
                pod_id: pod.id,
                config: config.clone(),
                updated_at: pod.created_at,
            },
        );
        inner.statuses.insert(
            pod.id,
            PodStatusRecord::from_observation(
                pod.id,
                ActualStatus::Pending,
                Some("Awaiting reconciler".to_string()),
                pod.created_at,
            ),
        );
        inner.push_event(pod.id, EventType::Created, Some("Pod created"));
        Ok(())
    }

    async fn update_desired_status(
        &self,
        id: &PodId,
        status: DesiredStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let pod = inner.pods.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity: "pod",
            id: id.to_string(),
        })?;
        pod.desired_status = status;
        pod.updated_at = Utc::now();
        Ok(())
    }

    async fn write_observation(
        &self,
        id: &PodId,
        status: ActualStatus,
        container_id: ContainerIdUpdate,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let pod = inner.pods.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity: "pod",
            id: id.to_string(),
        })?;
        pod.actual_status = status;
        pod.updated_at = now;
        match container_id {
            ContainerIdUpdate::Keep => {}
            ContainerIdUpdate::Set(cid) => pod.container_id = Some(cid),
            ContainerIdUpdate::Clear => pod.container_id = None,
        }
        inner.statuses.insert(
            *id,
            PodStatusRecord::from_observation(*id, status, message.map(str::to_string), now),
        );
        Ok(())
    }

    async fn append_event(
        &self,
        id: &PodId,
        event_type: EventType,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.push_event(*id, event_type, message);
        Ok(())
    }

    async fn list_pods(&self, tenant: Option<&TenantId>) -> Result<Vec<PodWithStatus>, StoreError> {
        let inner = self.inner.read().await;
        let mut pods: Vec<_> = inner
            .pods
            .values()
            .filter(|pod| tenant.map_or(true, |t| pod.tenant_id == *t))
            .cloned()
            .collect();
        pods.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pods
            .into_iter()
            .map(|pod| {
                let status = inner.statuses.get(&pod.id).cloned();
                PodWithStatus { pod, status }
            })
            .collect())
    }

    async fn get_pod(&self, id: &PodId) -> Result<Option<PodDetail>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.pods.get(id).map(|pod| PodDetail {
            pod: pod.clone(),
            status: inner.statuses.get(id).cloned(),
            config: inner.configs.get(id).cloned(),
        }))
    }

    async fn list_reconcilable(&self) -> Result<Vec<ReconcilablePod>, StoreError> {
        let inner = self.inner.read().await;
        let mut pods: Vec<_> = inner.pods.values().cloned().collect();
        pods.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pods
            .into_iter()
            .map(|pod| {
                let config = inner.configs.get(&pod.id).map(|c| c.config.clone());
                ReconcilablePod { pod, config }
            })
            .collect())
    }

    async fn subdomain_exists(&self, subdomain: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.pods.values().any(|pod| pod.subdomain == subdomain))
    }

    async fn status_changes_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PodStatusRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut changed: Vec<_> = inner
            .statuses
            .values()
            .filter(|status| status.updated_at >= since)
            .cloned()
            .collect();
        changed.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(changed)
    }

    async fn list_events(&self, id: &PodId, limit: i64) -> Result<Vec<PodEvent>, StoreError> {
        let inner = self.inner.read().await;
        let mut events: Vec<_> = inner
            .events
            .iter()
            .filter(|event| event.pod_id == *id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.id.cmp(&a.id));
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }
}
