//! Operation-versus-timer races
//!
//! Used for both the per-article prefetch timeout and the whole-run timeout.
//! Whichever side finishes first wins and the other future is dropped, which
//! cancels it.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// The timer won the race
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {limit:?}")]
pub struct TimedOut {
    pub limit: Duration,
}

/// Run `operation` against a `limit` timer
pub async fn race_timeout<F, T>(limit: Duration, operation: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        output = operation => Ok(output),
        _ = tokio::time::sleep(limit) => Err(TimedOut { limit }),
    }
}
