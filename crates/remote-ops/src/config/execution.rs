//! Per-request execution configuration
//!
//! Immutable once attached to a request. Milliseconds are stored as `u64`
//! so settings files stay readable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base * (attempt + 1)`
    #[default]
    Linear,
    /// `base * 2^attempt`
    Exponential,
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffStrategy::Linear => write!(f, "linear"),
            BackoffStrategy::Exponential => write!(f, "exponential"),
        }
    }
}

/// Execution configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Deadline per attempt (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Additional attempts after the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff seed (milliseconds)
    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,
    /// Gate the first attempt on a connectivity probe
    #[serde(default = "default_require_connectivity")]
    pub require_connectivity: bool,
    #[serde(default)]
    pub backoff: BackoffStrategy,
}

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_retry_delay_ms() -> u64 {
    1000
}
fn default_require_connectivity() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay_ms(),
            require_connectivity: default_require_connectivity(),
            backoff: BackoffStrategy::Linear,
        }
    }
}

impl ExecutionConfig {
    /// Backend reads
    pub fn query() -> Self {
        Self::default()
    }

    /// Backend writes get a longer deadline
    pub fn mutation() -> Self {
        Self {
            timeout_ms: 15_000,
            ..Self::default()
        }
    }

    /// Authentication calls retry once
    pub fn auth() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    /// Generative-AI calls are slow and expensive to repeat
    pub fn generation() -> Self {
        Self {
            timeout_ms: 60_000,
            max_retries: 1,
            ..Self::default()
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.base_retry_delay_ms = delay_ms;
        self
    }

    pub fn with_require_connectivity(mut self, require: bool) -> Self {
        self.require_connectivity = require;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Total attempts a sequence may make
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait after the failed attempt with 0-based index `attempt`
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.base_retry_delay_ms;
        let delay_ms = match self.backoff {
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt) + 1),
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(attempt))
            }
        };
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let query = ExecutionConfig::query();
        assert_eq!(query.timeout_ms, 10_000);
        assert_eq!(query.max_retries, 3);
        assert_eq!(query.base_retry_delay_ms, 1000);
        assert!(query.require_connectivity);

        assert_eq!(ExecutionConfig::mutation().timeout_ms, 15_000);
        assert_eq!(ExecutionConfig::auth().max_retries, 1);
        assert_eq!(ExecutionConfig::generation().max_retries, 1);
    }

    #[test]
    fn test_linear_delay() {
        let config = ExecutionConfig::default().with_base_retry_delay_ms(100);
        assert_eq!(config.retry_delay(0), Duration::from_millis(100));
        assert_eq!(config.retry_delay(1), Duration::from_millis(200));
        assert_eq!(config.retry_delay(2), Duration::from_millis(300));
    }

    #[test]
    fn test_exponential_delay() {
        let config = ExecutionConfig::default()
            .with_base_retry_delay_ms(100)
            .with_backoff(BackoffStrategy::Exponential);
        assert_eq!(config.retry_delay(0), Duration::from_millis(100));
        assert_eq!(config.retry_delay(1), Duration::from_millis(200));
        assert_eq!(config.retry_delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: ExecutionConfig = serde_yaml::from_str("max_retries: 5\n").unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.backoff, BackoffStrategy::Linear);
    }
}
