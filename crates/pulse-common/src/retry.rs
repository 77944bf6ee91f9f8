//! Shared retry schedule.
//!
//! Both the agent's HTTP sender and the SQL storage backend retry transient
//! failures on the same backoff ladder; only the retryability predicate
//! differs per domain. Cancellation is structural: a caller that stops
//! caring drops the future (typically via `tokio::time::timeout`), which
//! aborts the loop mid-sleep.

use std::future::Future;
use std::time::Duration;

/// Backoff ladder between attempts. Four attempts total, including the first.
pub const BACKOFFS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// Runs `op` until it succeeds, the error is classified terminal, or the
/// ladder is exhausted. Returns the last error in the failure cases.
pub async fn with_backoff<T, E, F, Fut>(mut op: F, is_retryable: impl Fn(&E) -> bool) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = BACKOFFS.len() + 1;
    for (i, backoff) in BACKOFFS.iter().enumerate() {
        match op().await {
            Ok(v) => {
                if i > 0 {
                    tracing::debug!(attempt = i + 1, "retry succeeded");
                }
                return Ok(v);
            }
            Err(e) if is_retryable(&e) => {
                tracing::warn!(
                    attempt = i + 1,
                    attempts,
                    error = %e,
                    backoff_secs = backoff.as_secs(),
                    "attempt failed, will retry"
                );
                tokio::time::sleep(*backoff).await;
            }
            Err(e) => {
                tracing::warn!(attempt = i + 1, attempts, error = %e, "attempt failed, not retryable");
                return Err(e);
            }
        }
    }
    op().await
}
