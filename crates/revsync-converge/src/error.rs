//! Error types for the convergence loop.

use thiserror::Error;

use revsync_store::StoreError;

use crate::compare::StoreDiff;

/// Terminal failures of a full replication.
///
/// Every variant leaves both stores in a consistent, partially replicated
/// state; re-running the same operation resumes from there.
#[derive(Debug, Error)]
pub enum ConvergenceError {
    /// A replication pass kept failing with a transient store error.
    #[error("store unavailable during {replication} after {attempts} attempts: {source}")]
    StoreUnavailable {
        replication: String,
        attempts: u32,
        source: StoreError,
    },

    /// Two consecutive passes left exactly the same revisions missing.
    #[error("convergence stalled after {passes} passes with {} revisions unreplicable", .diff.missing_count())]
    ConvergenceStalled { passes: u32, diff: StoreDiff },

    /// Taking a snapshot of a store failed.
    #[error("convergence check failed reading {store}: {source}")]
    ConvergenceCheckFailed { store: String, source: StoreError },

    /// The pass ceiling was reached before the stores converged.
    #[error("pass limit of {limit} reached with {} revisions still missing", .diff.missing_count())]
    PassLimitExceeded { limit: u32, diff: StoreDiff },

    /// A replication pass failed with a non-transient store error.
    #[error("replication pass {replication} failed: {source}")]
    PassFailed {
        replication: String,
        source: StoreError,
    },

    /// Cancelled between passes.
    #[error("convergence cancelled after {passes} passes")]
    Cancelled { passes: u32 },

    /// The overall deadline expired between passes.
    #[error("convergence deadline exceeded after {passes} passes")]
    DeadlineExceeded { passes: u32 },
}

impl ConvergenceError {
    /// Whether this failure came from two identical, non-empty diffs.
    pub fn is_stalled(&self) -> bool {
        matches!(self, ConvergenceError::ConvergenceStalled { .. })
    }

    /// The outstanding difference, for failures that carry one.
    pub fn diff(&self) -> Option<&StoreDiff> {
        match self {
            ConvergenceError::ConvergenceStalled { diff, .. }
            | ConvergenceError::PassLimitExceeded { diff, .. } => Some(diff),
            _ => None,
        }
    }
}

/// Result type for convergence operations.
pub type Result<T> = std::result::Result<T, ConvergenceError>;
