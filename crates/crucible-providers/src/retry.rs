//! Bounded retry for transient provider failures.

use std::future::Future;
use std::time::Duration;

use crucible_abstraction::DeployResult;
use tracing::warn;

/// Retry schedule for provider calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff_base: Duration::from_millis(250) }
    }
}

/// Runs `op` until it succeeds, fails permanently, or the attempt budget
/// runs out. Only errors marked retryable are tried again; everything
/// else surfaces on the first failure.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    op_name: &str,
    mut op: F,
) -> DeployResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DeployResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff_base * 2u32.pow(attempt - 1);
                warn!(
                    op = %op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay = ?delay,
                    error = %error,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crucible_abstraction::DeployError;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy { max_attempts: 3, backoff_base: Duration::from_millis(1) }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = retry_with_backoff(fast_policy(), "deploy", move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DeployError::transient("test", "flaky"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_surfaces_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: DeployResult<()> = retry_with_backoff(fast_policy(), "deploy", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DeployError::Validation("bad config".to_string()))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().code(), "validation");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_budget_is_enforced() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: DeployResult<()> = retry_with_backoff(fast_policy(), "deploy", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DeployError::transient("test", "still down"))
            }
        })
        .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
