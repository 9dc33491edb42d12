//! Store errors

use thiserror::Error;

/// Errors surfaced by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The operation would violate a relational constraint.
    #[error("{0}")]
    Conflict(String),

    /// Could not reach or authenticate with the database.
    #[error("database connection failed: {0}")]
    Connection(String),

    /// A query failed at the database.
    #[error("query failed: {0}")]
    Query(String),

    /// A row held data that does not map back onto the record types.
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                entity: "row",
                id: String::new(),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                StoreError::Connection(err.to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

impl From<podhost_types::StatusParseError> for StoreError {
    fn from(err: podhost_types::StatusParseError) -> Self {
        StoreError::InvalidData(err.to_string())
    }
}
