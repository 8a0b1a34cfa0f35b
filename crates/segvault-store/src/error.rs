//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Column (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A stored row violates a model constraint.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Blocking task failed or a lock was poisoned.
    #[error("storage task failed: {0}")]
    Task(String),

    /// I/O error (filesystem blob store).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<segvault_core::CoreError> for StoreError {
    fn from(e: segvault_core::CoreError) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
