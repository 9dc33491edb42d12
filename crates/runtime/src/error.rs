//! Runtime gateway errors

use thiserror::Error;

/// Errors from the container engine boundary.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Could not reach the engine.
    #[error("engine connection failed: {0}")]
    Connection(String),

    /// The engine rejected or failed an operation.
    #[error("engine error: {0}")]
    Engine(String),

    /// A container spec cannot be translated into an engine call.
    #[error("invalid container spec: {0}")]
    InvalidSpec(String),
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        RuntimeError::Engine(err.to_string())
    }
}
