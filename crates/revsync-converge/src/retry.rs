//! Retry of transient store failures.

use std::future::Future;

use revsync_store::{Result as StoreResult, StoreError};
use tracing::warn;

use crate::config::RetryPolicy;

/// A store error that outlived the retry policy.
#[derive(Debug)]
pub(crate) struct Exhausted {
    pub error: StoreError,
    pub attempts: u32,
}

/// Run `op`, retrying transient failures with jittered exponential backoff.
///
/// Non-transient errors are returned after the first attempt.
pub(crate) async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> std::result::Result<T, Exhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                warn!(
                    operation = what,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient store failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(Exhausted {
                    error,
                    attempts: attempt + 1,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryPolicy::immediate(3), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Unavailable("down".into()))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = AtomicU32::new(0);
        let exhausted = with_retry(&RetryPolicy::immediate(2), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(StoreError::Unavailable("down".into()))
        })
        .await
        .unwrap_err();

        assert_eq!(exhausted.attempts, 3);
        assert!(exhausted.error.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let exhausted = with_retry(&RetryPolicy::immediate(5), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(StoreError::Internal("broken".into()))
        })
        .await
        .unwrap_err();

        assert_eq!(exhausted.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
