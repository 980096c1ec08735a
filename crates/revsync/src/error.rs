//! Error type spanning every revsync layer.

use revsync_converge::ConvergenceError;
use revsync_core::CoreError;
use revsync_store::StoreError;
use thiserror::Error;

/// Errors from any revsync operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed revision id or history.
    #[error("invalid revision: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Full replication did not converge.
    #[error("replication error: {0}")]
    Convergence(#[from] ConvergenceError),
}

impl Error {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Core(_) => false,
            Error::Store(e) => e.is_transient(),
            Error::Convergence(e) => matches!(
                e,
                ConvergenceError::StoreUnavailable { .. }
                    | ConvergenceError::Cancelled { .. }
                    | ConvergenceError::DeadlineExceeded { .. }
            ),
        }
    }
}

/// Result type for revsync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let unavailable: Error = StoreError::Unavailable("down".into()).into();
        assert!(unavailable.is_retryable());

        let stalled: Error = ConvergenceError::ConvergenceStalled {
            passes: 2,
            diff: Default::default(),
        }
        .into();
        assert!(!stalled.is_retryable());

        let cancelled: Error = ConvergenceError::Cancelled { passes: 1 }.into();
        assert!(cancelled.is_retryable());
        assert!(cancelled.to_string().contains("cancelled after 1 passes"));
    }
}
