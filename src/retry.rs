//! Bounded exponential backoff around collaborator calls.

use crate::config::RetryConfig;
use crate::Result;
use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `op`, retrying only errors for which `is_transient()` holds.
/// Permanent errors and the last transient error are returned as-is.
pub async fn with_backoff<T, F, Fut>(policy: &RetryConfig, operation: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let schedule = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_interval)
        .with_max_interval(policy.max_interval)
        .with_max_elapsed_time(Some(policy.max_elapsed))
        .build();

    backoff::future::retry_notify(
        schedule,
        || {
            let attempt = op();
            async move {
                attempt.await.map_err(|e| {
                    if e.is_transient() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        },
        |err, wait: Duration| {
            warn!(
                operation,
                error = %err,
                retry_in_ms = wait.as_millis() as u64,
                "Transient collaborator failure, retrying"
            );
        },
    )
    .await
}
