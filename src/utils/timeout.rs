// src/utils/timeout.rs
// Bounds a future by a wall-clock timeout, used around the reply producer call.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("operation timed out after {0:?}")]
pub struct TimedOut(pub Duration);

/// Runs `fut` to completion or returns `Err(TimedOut)` once `duration` elapses.
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| TimedOut(duration))
}
