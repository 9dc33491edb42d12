//! Core error taxonomy.
//!
//! Every failure leaving the services collapses into one of four categories
//! with a stable machine-readable code, so outer surfaces (HTTP, CLI) can map
//! them without inspecting messages.

use podhost_adapters::{AdapterError, ConfigIssue, ValidationFailure};
use podhost_runtime::RuntimeError;
use podhost_store::StoreError;
use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The request itself is malformed or fails config validation.
    #[error("{message}")]
    Validation {
        message: String,
        issues: Vec<ConfigIssue>,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The request conflicts with current state.
    #[error("{0}")]
    Conflict(String),

    /// Anything the caller cannot fix by changing the request.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
            issues: Vec::new(),
        }
    }

    /// Stable error code for API surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation { .. } => "VALIDATION_ERROR",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status an outer surface should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::Validation { .. } => 400,
            CoreError::NotFound { .. } => 404,
            CoreError::Conflict(_) => 409,
            CoreError::Internal(_) => 500,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            StoreError::Conflict(message) => CoreError::Conflict(message),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

impl From<RuntimeError> for CoreError {
    fn from(err: RuntimeError) -> Self {
        CoreError::Internal(err.to_string())
    }
}

impl From<AdapterError> for CoreError {
    fn from(err: AdapterError) -> Self {
        CoreError::Internal(err.to_string())
    }
}

impl From<ValidationFailure> for CoreError {
    fn from(err: ValidationFailure) -> Self {
        CoreError::Validation {
            message: err.to_string(),
            issues: err.issues,
        }
    }
}

impl From<CryptoError> for CoreError {
    fn from(err: CryptoError) -> Self {
        CoreError::Internal(err.to_string())
    }
}
