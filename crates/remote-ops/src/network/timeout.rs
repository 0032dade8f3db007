//! Deadline-bounded execution and cancellable delays
//!
//! An attempt races its operation against a timer. Whichever finishes first
//! wins; the loser is dropped, so a late result can never be observed.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::execution::{AttemptError, Failure};

/// The executor's own deadline signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Operation timed out after {timeout_ms}ms")]
pub struct TimeoutError {
    /// Configured deadline (milliseconds)
    pub timeout_ms: u64,
}

/// The sequence owning this wait was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Operation aborted")]
pub struct AbortError;

/// Run an operation with a deadline.
///
/// A failure raised by the operation before the deadline is propagated
/// unchanged; classification happens later.
pub async fn run_with_deadline<T, E, Fut>(operation: Fut, timeout_ms: u64) -> Result<T, AttemptError>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<Failure>,
{
    match timeout(Duration::from_millis(timeout_ms), operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(AttemptError::Operation(error.into())),
        Err(_) => Err(AttemptError::Deadline(TimeoutError { timeout_ms })),
    }
}

/// Run an operation with a deadline, giving up early if `cancel_token` fires.
pub async fn run_with_deadline_or_cancel<T, E, Fut>(
    operation: Fut,
    timeout_ms: u64,
    cancel_token: &CancellationToken,
) -> Result<Result<T, AttemptError>, AbortError>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<Failure>,
{
    tokio::select! {
        biased;
        _ = cancel_token.cancelled() => Err(AbortError),
        result = run_with_deadline(operation, timeout_ms) => Ok(result),
    }
}

/// Sleep that ends early with [`AbortError`] when the token is cancelled
pub async fn cancelable_delay(
    delay: Duration,
    cancel_token: Option<&CancellationToken>,
) -> Result<(), AbortError> {
    let sleep = tokio::time::sleep(delay);

    match cancel_token {
        Some(token) => {
            tokio::select! {
                _ = sleep => Ok(()),
                _ = token.cancelled() => Err(AbortError),
            }
        }
        None => {
            sleep.await;
            Ok(())
        }
    }
}
