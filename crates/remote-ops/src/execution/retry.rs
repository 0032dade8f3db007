//! Retry/backoff controller
//!
//! Drives repeated attempts of one operation: pre-flight connectivity gate,
//! deadline per attempt, classification, linear (or exponential) backoff and
//! a connectivity re-probe after network failures. Every outcome is returned
//! as a value; nothing escapes as an error.

use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::classify::Classifier;
use super::error::{Classification, ErrorClass, Failure, FailureDetail};
use crate::config::ExecutionConfig;
use crate::network::{cancelable_delay, run_with_deadline_or_cancel, ConnectivityProber};

/// Tagged outcome of an attempt sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Failed(FailureDetail),
    /// The sequence was cancelled before it resolved
    Cancelled { attempts: u32 },
}

impl<T> ExecutionOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ExecutionOutcome::Succeeded { attempts, .. } => *attempts,
            ExecutionOutcome::Failed(detail) => detail.attempts,
            ExecutionOutcome::Cancelled { attempts } => *attempts,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            ExecutionOutcome::Succeeded { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureDetail> {
        match self {
            ExecutionOutcome::Failed(detail) => Some(detail),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<T, FailureDetail> {
        match self {
            ExecutionOutcome::Succeeded { value, .. } => Ok(value),
            ExecutionOutcome::Failed(detail) => Err(detail),
            ExecutionOutcome::Cancelled { attempts } => {
                Err(FailureDetail::exhausted(
                    Classification::new(
                        ErrorClass::Unknown,
                        Some("AbortError".to_string()),
                        "Operation aborted",
                    ),
                    attempts,
                ))
            }
        }
    }
}

/// Retry controller; cheap to share behind an `Arc`
#[derive(Debug, Clone)]
pub struct RetryController {
    prober: ConnectivityProber,
    classifier: Arc<Classifier>,
}

impl RetryController {
    pub fn new(prober: ConnectivityProber) -> Self {
        Self::with_classifier(prober, Classifier::default())
    }

    pub fn with_classifier(prober: ConnectivityProber, classifier: Classifier) -> Self {
        Self {
            prober,
            classifier: Arc::new(classifier),
        }
    }

    pub fn prober(&self) -> &ConnectivityProber {
        &self.prober
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Run `operation` under `config` until it succeeds or the budget is spent.
    pub async fn execute<T, E, F, Fut>(&self, operation: F, config: &ExecutionConfig) -> ExecutionOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        self.execute_with_cancel(operation, config, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), stopping at the next suspension point
    /// once `cancel_token` fires.
    pub async fn execute_with_cancel<T, E, F, Fut>(
        &self,
        mut operation: F,
        config: &ExecutionConfig,
        cancel_token: &CancellationToken,
    ) -> ExecutionOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        if config.require_connectivity {
            let status = self.prober.check_now().await;
            if !status.is_connected {
                tracing::warn!("offline, skipping operation");
                return ExecutionOutcome::Failed(FailureDetail::offline());
            }
        }

        let max_attempts = config.max_attempts();
        let mut attempts = 0;
        let mut last: Option<Classification> = None;

        for attempt in 0..max_attempts {
            if cancel_token.is_cancelled() {
                return ExecutionOutcome::Cancelled { attempts };
            }

            attempts += 1;
            let result =
                match run_with_deadline_or_cancel(operation(), config.timeout_ms, cancel_token)
                    .await
                {
                    Ok(result) => result,
                    Err(_) => return ExecutionOutcome::Cancelled { attempts },
                };

            let error = match result {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::debug!(attempts, "operation succeeded after retry");
                    }
                    return ExecutionOutcome::Succeeded { value, attempts };
                }
                Err(error) => error,
            };

            let classification = self.classifier.classify(&error);
            let class = classification.class;

            if class == ErrorClass::NonRetryable {
                tracing::debug!(error = %error, "non-retryable failure, not retrying");
                return ExecutionOutcome::Failed(FailureDetail::exhausted(classification, attempts));
            }

            if attempt + 1 == max_attempts {
                last = Some(classification);
                break;
            }

            let delay = config.retry_delay(attempt);
            tracing::warn!(
                attempt = attempts,
                max_attempts,
                class = %class,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "attempt failed, retrying"
            );
            last = Some(classification);

            if cancelable_delay(delay, Some(cancel_token)).await.is_err() {
                return ExecutionOutcome::Cancelled { attempts };
            }

            if class == ErrorClass::Network && config.require_connectivity {
                let status = self.prober.check_now().await;
                if !status.is_connected {
                    tracing::warn!(attempts, "connectivity lost, abandoning retries");
                    return ExecutionOutcome::Failed(FailureDetail::connectivity_lost(attempts));
                }
            }
        }

        match last {
            Some(classification) => {
                let detail = FailureDetail::exhausted(classification, attempts);
                tracing::warn!(attempts, error = %detail, "operation failed");
                ExecutionOutcome::Failed(detail)
            }
            // max_attempts is at least 1, so the loop ran and either returned or set `last`
            None => ExecutionOutcome::Cancelled { attempts },
        }
    }
}
