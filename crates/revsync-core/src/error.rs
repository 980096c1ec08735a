//! Error types for the revsync core model.

use thiserror::Error;

use crate::types::{DocumentId, RevisionId};

/// Errors raised while parsing or assembling revision data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid revision id {0:?}: expected <generation>-<hash>")]
    InvalidRevisionId(String),

    #[error("invalid revision history for {rev}: {reason}")]
    InvalidHistory { rev: RevisionId, reason: String },

    #[error("revision {rev} belongs to document {found}, not {expected}")]
    DocumentMismatch {
        rev: RevisionId,
        expected: DocumentId,
        found: DocumentId,
    },

    #[error("revision {rev} already recorded with parent {existing}, refusing parent {new}")]
    ParentMismatch {
        rev: RevisionId,
        existing: RevisionId,
        new: RevisionId,
    },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
