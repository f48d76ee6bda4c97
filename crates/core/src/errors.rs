//! Error types shared across the reconciliation layer.

use thiserror::Error;

use crate::offline::MutationError;

/// Result type alias for rollcall operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for the reconciliation and offline-mutation layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A mutation failed while the device was online; surfaced to the caller as-is.
    #[error("Mutation failed: {0}")]
    Mutation(#[from] MutationError),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Storage-level failures, independent of the concrete backend.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Pool creation failed: {0}")]
    PoolCreationFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
