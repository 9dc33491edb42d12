//! Shared types for the podhost control plane.
//!
//! Everything that crosses a crate boundary lives here: strongly-typed
//! identifiers, the pod lifecycle enums, the persisted record shapes, and the
//! declarative container spec that adapters produce and the runtime gateway
//! consumes.

pub mod container;
pub mod ids;
pub mod platform;
pub mod records;
pub mod status;

pub use container::{
    ContainerSpec, HealthCheckSpec, PortProtocol, PortSpec, ResourceSpec, RestartPolicy,
    VolumeSpec,
};
pub use ids::{PodId, TenantId};
pub use platform::PlatformContext;
pub use records::{Pod, PodConfig, PodEvent, PodStatusRecord, Tenant};
pub use status::{ActualStatus, DesiredStatus, EventType, StatusParseError};
