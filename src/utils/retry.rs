use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Fixed-Delay Retry Strategy
// ============================================================================
//
// Re-invokes a whole operation a bounded number of times with the same delay
// between attempts (no exponential backoff). Each attempt is a fresh, explicit
// invocation: nothing is deduplicated here, so retried work is only as
// idempotent as the operation itself makes it.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts = retries + 1
    pub retries: u32,
    /// Delay between consecutive attempts
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }
}

/// Result of a retry operation
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded
    Success(T),
    /// Operation failed after all retries
    Failed(E),
    /// Operation permanently failed (should not retry)
    PermanentFailure(E),
}

/// Check if an error is transient (should retry) or permanent (should not retry)
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Retry with transient error checking. `operation` receives the 1-based
/// attempt number.
pub async fn retry_on_transient<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        tracing::debug!(
            attempt = attempt,
            max_attempts = config.max_attempts(),
            "Attempting operation"
        );

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return RetryResult::Success(result);
            }
            Err(error) => {
                if !error.is_transient() {
                    tracing::error!(
                        error = %error,
                        "Permanent failure detected, not retrying"
                    );
                    return RetryResult::PermanentFailure(error);
                }

                if attempt >= config.max_attempts() {
                    tracing::error!(
                        attempt = attempt,
                        error = %error,
                        "Operation failed after all retries"
                    );
                    return RetryResult::Failed(error);
                }

                tracing::warn!(
                    attempt = attempt,
                    error = %error,
                    delay_ms = config.delay.as_millis(),
                    "Transient failure, retrying after delay"
                );

                sleep(config.delay).await;
            }
        }
    }
}
