//! Persisted record shapes.
//!
//! These mirror the relational schema one-to-one. The store crate maps rows to
//! and from these structs; nothing here knows about SQL.

use crate::ids::{PodId, TenantId};
use crate::status::{ActualStatus, DesiredStatus, EventType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tenant owning zero or more pods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A pod row: the unit of desired/actual state.
///
/// `desired_status` is written only by the pod service, `actual_status` and
/// `container_id` only by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub id: PodId,
    pub tenant_id: TenantId,
    pub name: String,
    pub adapter_id: String,
    /// Globally unique routing-facing name segment.
    pub subdomain: String,
    pub desired_status: DesiredStatus,
    pub actual_status: ActualStatus,
    pub container_id: Option<String>,
    /// Per-pod secret; plaintext in memory, possibly encrypted at rest.
    pub gateway_token: String,
    /// Filesystem root for the pod's persistent volume.
    pub data_dir: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The validated configuration object for a pod, 1:1 with the pod row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodConfig {
    pub pod_id: PodId,
    pub config: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

/// Status snapshot, upserted by the reconciler on every pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodStatusRecord {
    pub pod_id: PodId,
    pub phase: String,
    pub ready: bool,
    pub message: Option<String>,
    pub last_health_at: Option<DateTime<Utc>>,
    pub memory_mb: Option<i32>,
    pub cpu_percent: Option<f32>,
    pub storage_mb: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl PodStatusRecord {
    /// Snapshot derived from an observed actual status.
    pub fn from_observation(
        pod_id: PodId,
        status: ActualStatus,
        message: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            pod_id,
            phase: status.as_str().to_string(),
            ready: status.is_ready(),
            message,
            last_health_at: None,
            memory_mb: None,
            cpu_percent: None,
            storage_mb: None,
            updated_at,
        }
    }
}

/// Append-only event log row; the audit timeline of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodEvent {
    pub id: i64,
    pub pod_id: PodId,
    pub event_type: EventType,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}
