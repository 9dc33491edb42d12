//! Container runtime gateway.
//!
//! The core drives containers through the [`ContainerRuntime`] trait; the
//! Docker engine specifics (labels, health-check translation, network
//! attachment, resource-limit units) live entirely in [`DockerRuntime`].

pub mod docker;
pub mod error;
pub mod traits;

pub use docker::DockerRuntime;
pub use error::RuntimeError;
pub use traits::{
    ContainerRef, ContainerRuntime, ContainerState, ContainerStatus, LogOptions, RuntimeContext,
};
