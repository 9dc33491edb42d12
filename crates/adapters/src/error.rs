//! Adapter error types

use thiserror::Error;

/// Errors raised by adapter hooks and spec resolution.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// A lifecycle hook failed.
    #[error("lifecycle hook failed: {0}")]
    Hook(String),

    /// Resolving the container spec from config failed.
    #[error("container spec resolution failed: {0}")]
    SpecResolution(String),
}
