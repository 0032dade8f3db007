//! Failure model
//!
//! What an attempt can fail with, how a failure is classified, and the final
//! detail the controller reports once a sequence gives up.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::network::TimeoutError;

/// Opaque failure raised by a caller-supplied operation.
///
/// The core never inspects structured backend codes, only the `name` and
/// `message` text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Failure {
    /// Error type name, when the source carries one (e.g. `"AuthApiError"`)
    pub name: Option<String>,
    /// Human readable message
    pub message: String,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: None,
            message: message.into(),
        }
    }

    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for Failure {
    fn from(error: anyhow::Error) -> Self {
        // `{:#}` keeps the context chain, which is where transport errors usually hide
        Self::new(format!("{:#}", error))
    }
}

impl From<std::io::Error> for Failure {
    fn from(error: std::io::Error) -> Self {
        Self::named(format!("{:?}", error.kind()), error.to_string())
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result of a single attempt that did not succeed.
#[derive(Debug, Clone, Error)]
pub enum AttemptError {
    /// The executor's own deadline fired first
    #[error(transparent)]
    Deadline(#[from] TimeoutError),
    /// The operation failed before the deadline
    #[error(transparent)]
    Operation(#[from] Failure),
}

impl AttemptError {
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            AttemptError::Deadline(_) => Some("TimeoutError"),
            AttemptError::Operation(failure) => failure.name.as_deref(),
        }
    }
}

/// Failure taxonomy driving retry and reporting policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Network,
    Timeout,
    NonRetryable,
    Unknown,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorClass::NonRetryable)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Network => write!(f, "network_error"),
            ErrorClass::Timeout => write!(f, "timeout_error"),
            ErrorClass::NonRetryable => write!(f, "non_retryable_error"),
            ErrorClass::Unknown => write!(f, "unknown_error"),
        }
    }
}

/// A classified failure, keeping the original detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub class: ErrorClass,
    pub name: Option<String>,
    pub message: String,
}

impl Classification {
    pub fn new(class: ErrorClass, name: Option<String>, message: impl Into<String>) -> Self {
        Self {
            class,
            name,
            message: message.into(),
        }
    }
}

/// How presentation code should treat a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Offer a retry affordance; eligible for reconnect auto-retry
    Offline,
    /// Show the message, never auto-retry
    Rejected,
    /// Show the message with a manual retry
    Exhausted,
}

/// Final failure of an attempt sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub classification: Classification,
    /// Message for display
    pub message: String,
    /// Attempts actually made against the operation
    pub attempts: u32,
}

impl FailureDetail {
    /// Build the final report from the last classified failure.
    pub fn exhausted(classification: Classification, attempts: u32) -> Self {
        let message = match classification.class {
            ErrorClass::Timeout => format!("request timed out after {}", attempt_count(attempts)),
            ErrorClass::Network => format!("network error after {}", attempt_count(attempts)),
            ErrorClass::NonRetryable | ErrorClass::Unknown => classification.message.clone(),
        };
        Self {
            classification,
            message,
            attempts,
        }
    }

    /// Pre-flight connectivity check failed; the operation was never attempted.
    pub fn offline() -> Self {
        let message = "no network connection".to_string();
        Self {
            classification: Classification::new(
                ErrorClass::Network,
                Some("OfflineError".to_string()),
                message.clone(),
            ),
            message,
            attempts: 0,
        }
    }

    /// Connectivity dropped between attempts.
    pub fn connectivity_lost(attempts: u32) -> Self {
        let message = "lost connectivity mid-operation".to_string();
        Self {
            classification: Classification::new(
                ErrorClass::Network,
                Some("OfflineError".to_string()),
                message.clone(),
            ),
            message,
            attempts,
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.classification.class
    }

    pub fn category(&self) -> FailureCategory {
        match self.classification.class {
            ErrorClass::Network => FailureCategory::Offline,
            ErrorClass::NonRetryable => FailureCategory::Rejected,
            ErrorClass::Timeout | ErrorClass::Unknown => FailureCategory::Exhausted,
        }
    }

    /// Display message that always carries the attempt count
    pub fn summary(&self) -> String {
        if self.message.contains(&format!("{} attempt", self.attempts)) {
            self.message.clone()
        } else {
            format!("{} (after {})", self.message, attempt_count(self.attempts))
        }
    }
}

fn attempt_count(attempts: u32) -> String {
    if attempts == 1 {
        "1 attempt".to_string()
    } else {
        format!("{} attempts", attempts)
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_by_class() {
        let timeout = FailureDetail::exhausted(
            Classification::new(ErrorClass::Timeout, None, "Operation timed out after 50ms"),
            4,
        );
        assert_eq!(timeout.message, "request timed out after 4 attempts");

        let network = FailureDetail::exhausted(
            Classification::new(ErrorClass::Network, None, "connection refused"),
            4,
        );
        assert_eq!(network.message, "network error after 4 attempts");

        let unknown = FailureDetail::exhausted(
            Classification::new(ErrorClass::Unknown, None, "boom"),
            4,
        );
        assert_eq!(unknown.message, "boom");
        assert_eq!(unknown.summary(), "boom (after 4 attempts)");
    }

    #[test]
    fn test_category() {
        assert_eq!(FailureDetail::offline().category(), FailureCategory::Offline);
        let rejected = FailureDetail::exhausted(
            Classification::new(ErrorClass::NonRetryable, None, "Unauthorized"),
            1,
        );
        assert_eq!(rejected.category(), FailureCategory::Rejected);
        assert_eq!(rejected.summary(), "Unauthorized (after 1 attempt)");
    }

    #[test]
    fn test_summary_counts_attempts_even_when_raw_text_mentions_attempts() {
        let unknown = FailureDetail::exhausted(
            Classification::new(ErrorClass::Unknown, None, "too many login attempts"),
            3,
        );
        assert_eq!(unknown.summary(), "too many login attempts (after 3 attempts)");

        let network = FailureDetail::exhausted(
            Classification::new(ErrorClass::Network, None, "socket hang up"),
            3,
        );
        assert_eq!(network.summary(), "network error after 3 attempts");

        let single = FailureDetail::exhausted(
            Classification::new(ErrorClass::Timeout, None, "Operation timed out after 50ms"),
            1,
        );
        assert_eq!(single.summary(), "request timed out after 1 attempt");
    }

    #[test]
    fn test_failure_from_io_error_keeps_kind_as_name() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let failure = Failure::from(io);
        assert_eq!(failure.name.as_deref(), Some("ConnectionRefused"));
        assert_eq!(failure.message, "refused");
    }

    #[test]
    fn test_failure_from_anyhow_keeps_context() {
        let err = anyhow::anyhow!("dns lookup failed").context("loading buckets");
        let failure = Failure::from(err);
        assert_eq!(failure.message, "loading buckets: dns lookup failed");
    }
}
