//! Retry wrapper for idempotent operations
//!
//! Only errors that point at transient infrastructure trouble are retried:
//! [`ErrorKind::Network`](jobwire_core::ErrorKind::Network) and
//! [`ErrorKind::Server`](jobwire_core::ErrorKind::Server). Auth, not-found,
//! validation, timeout, and unknown errors surface on first occurrence.
//!
//! Attempts run strictly one after another. The delay before retry `n`
//! (0-indexed) comes from the supplied [`BackoffStrategy`]; with the default
//! [`ExponentialBackoff::request_default`](crate::ExponentialBackoff::request_default)
//! that is 1 s, 2 s, 4 s. Once the strategy gives up the last error is
//! returned unchanged.

use crate::backoff::BackoffStrategy;
use jobwire_core::Result;
use std::future::Future;

/// Run `operation`, retrying transient failures according to `strategy`
///
/// # Examples
///
/// ```rust,no_run
/// use jobwire_client::{with_retry, ExponentialBackoff};
///
/// # async fn fetch() -> jobwire_core::Result<u32> { Ok(1) }
/// # async fn example() -> jobwire_core::Result<()> {
/// let value = with_retry(&ExponentialBackoff::request_default(), || fetch()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_retry<S, F, Fut, T>(strategy: &S, mut operation: F) -> Result<T>
where
    S: BackoffStrategy + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !error.is_retryable() {
            tracing::debug!(kind = %error.kind(), "Not retrying non-transient failure");
            return Err(error);
        }

        let Some(delay) = strategy.next_delay(attempt) else {
            tracing::warn!(attempts = attempt + 1, error = %error, "Retries exhausted");
            return Err(error);
        };

        attempt += 1;
        tracing::warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying after transient failure"
        );
        tokio::time::sleep(delay).await;
    }
}
