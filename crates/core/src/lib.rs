//! Control-plane core.
//!
//! The pod and tenant services translate caller requests into desired state;
//! the reconciler converges container reality toward that state on a fixed
//! cadence; the status feed surfaces the resulting snapshot changes.

pub mod crypto;
pub mod error;
pub mod feed;
pub mod pod;
pub mod reconciler;
pub mod tenant;

pub use crypto::{looks_encrypted, EncryptionKey};
pub use error::CoreError;
pub use feed::StatusFeed;
pub use pod::{CreatePodRequest, PodService};
pub use reconciler::{ReconcileFailure, ReconcileSummary, Reconciler, DEFAULT_INTERVAL};
pub use tenant::TenantService;
