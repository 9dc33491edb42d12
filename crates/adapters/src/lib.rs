//! Adapter descriptors and registry.
//!
//! An adapter describes how one workload type maps onto a container: its
//! default container spec, the configuration schema users fill in, optional
//! lifecycle hooks, and a pure resolution function that turns validated config
//! plus platform context into a final container spec. The core consumes
//! adapters through the [`AgentAdapter`] trait and never knows about any
//! specific workload.

pub mod adapter;
pub mod chatrelay;
pub mod error;
pub mod registry;
pub mod schema;

pub use adapter::{
    AdapterCategory, AdapterMeta, AgentAdapter, ConfigChangeAction, ConfigChangeContext,
    CreateArtifacts, InitialFile, LifecycleContext,
};
pub use chatrelay::ChatRelayAdapter;
pub use error::AdapterError;
pub use registry::AdapterRegistry;
pub use schema::{ConfigIssue, ConfigSchema, FieldKind, FieldSpec, UiHint, ValidationFailure};
