//! Error types for the store module.

use thiserror::Error;

use revsync_core::CoreError;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Body serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Document, revision, or revision body not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An ordinary write did not extend a current leaf.
    #[error("conflict on document {document_id}: {reason}")]
    Conflict { document_id: String, reason: String },

    /// Malformed revision id or history.
    #[error("invalid revision: {0}")]
    InvalidRevision(#[from] CoreError),

    /// The store could not be reached. Transient.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Internal failure (poisoned lock, panicked blocking task).
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
