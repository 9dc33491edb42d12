//! The persistence interface the services and reconciler depend on.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use podhost_types::{
    ActualStatus, DesiredStatus, EventType, Pod, PodConfig, PodEvent, PodId, PodStatusRecord,
    Tenant, TenantId,
};
use serde_json::{Map, Value};

/// How a reconciler observation should touch the stored container id.
///
/// `Keep` leaves the column untouched, `Set` records a new id, `Clear` nulls
/// it out after removal. Collapsing these into an `Option` would lose the
/// keep/clear distinction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerIdUpdate {
    Keep,
    Set(String),
    Clear,
}

/// A pod together with its latest status snapshot, for listings.
#[derive(Debug, Clone)]
pub struct PodWithStatus {
    pub pod: Pod,
    pub status: Option<PodStatusRecord>,
}

/// Everything known about one pod.
#[derive(Debug, Clone)]
pub struct PodDetail {
    pub pod: Pod,
    pub status: Option<PodStatusRecord>,
    pub config: Option<PodConfig>,
}

/// One unit of reconciler work: the pod row and its validated config.
#[derive(Debug, Clone)]
pub struct ReconcilablePod {
    pub pod: Pod,
    pub config: Option<Map<String, Value>>,
}

/// Persistence surface for tenants, pods, status snapshots, and events.
///
/// `gateway_token` flows through as an opaque string: callers hand in the
/// at-rest form (possibly encrypted) and read the same form back out.
#[async_trait]
pub trait PodStore: Send + Sync {
    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError>;

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError>;

    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError>;

    async fn tenant_exists(&self, id: &TenantId) -> Result<bool, StoreError>;

    /// Deletes a tenant. Fails with [`StoreError::Conflict`] while any pod
    /// still references it; the check and delete happen under a row lock so a
    /// concurrent pod create cannot slip between them.
    async fn delete_tenant(&self, id: &TenantId) -> Result<(), StoreError>;

    /// Inserts a pod, its config document, an initial pending status snapshot,
    /// and a `created` event in one transaction. `stored_gateway_token` is the
    /// at-rest token written in place of `pod.gateway_token`.
    async fn insert_pod(
        &self,
        pod: &Pod,
        stored_gateway_token: &str,
        config: &Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Records caller intent. Fails with [`StoreError::NotFound`] when the pod
    /// row is gone.
    async fn update_desired_status(
        &self,
        id: &PodId,
        status: DesiredStatus,
    ) -> Result<(), StoreError>;

    /// Writes one reconciler observation: actual status plus container-id
    /// update on the pod row, and an upserted status snapshot.
    async fn write_observation(
        &self,
        id: &PodId,
        status: ActualStatus,
        container_id: ContainerIdUpdate,
        message: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn append_event(
        &self,
        id: &PodId,
        event_type: EventType,
        message: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Lists pods, optionally scoped to one tenant, newest first.
    async fn list_pods(&self, tenant: Option<&TenantId>) -> Result<Vec<PodWithStatus>, StoreError>;

    async fn get_pod(&self, id: &PodId) -> Result<Option<PodDetail>, StoreError>;

    /// Every pod the reconciler must look at, including ones marked for
    /// deletion whose rows still exist.
    async fn list_reconcilable(&self) -> Result<Vec<ReconcilablePod>, StoreError>;

    async fn subdomain_exists(&self, subdomain: &str) -> Result<bool, StoreError>;

    /// Status snapshots updated at or after `since`, oldest first. The
    /// boundary is inclusive so feed consumers never drop a change that lands
    /// exactly on their cursor.
    async fn status_changes_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PodStatusRecord>, StoreError>;

    /// Most recent events for a pod, newest first.
    async fn list_events(&self, id: &PodId, limit: i64) -> Result<Vec<PodEvent>, StoreError>;
}
