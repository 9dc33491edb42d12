//! Pod store.
//!
//! All persistence goes through the [`PodStore`] trait. [`PostgresStore`] is
//! the production backend; [`InMemoryPodStore`] backs tests and local
//! development with the same semantics.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::StoreError;
pub use memory::InMemoryPodStore;
pub use postgres::PostgresStore;
pub use traits::{ContainerIdUpdate, PodDetail, PodStore, PodWithStatus, ReconcilablePod};
