//! Settings loading
//!
//! Sources, lowest priority first: built-in defaults, the YAML settings file,
//! environment variables.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::execution::ExecutionConfig;
use crate::logging::LoggingConfig;
use crate::network::DEFAULT_PROBE_URL;

/// Overrides the settings directory
pub const CONFIG_DIR_ENV: &str = "REMOTE_OPS_CONFIG_DIR";
pub const PROBE_URL_ENV: &str = "REMOTE_OPS_PROBE_URL";
pub const PROBE_INTERVAL_ENV: &str = "REMOTE_OPS_PROBE_INTERVAL_MS";
pub const LOG_LEVEL_ENV: &str = "REMOTE_OPS_LOG_LEVEL";

const SETTINGS_FILE: &str = "settings.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Connectivity prober configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProberConfig {
    /// Endpoint hit with a HEAD request
    #[serde(default = "default_probe_url")]
    pub probe_url: String,
    /// Sub-timeout for the reachability request (milliseconds)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Background probe period (milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Consult the interface signal when the probe fails
    #[serde(default = "default_interface_fallback")]
    pub interface_fallback: bool,
}

fn default_probe_url() -> String {
    DEFAULT_PROBE_URL.to_string()
}
fn default_probe_timeout_ms() -> u64 {
    3000
}
fn default_interval_ms() -> u64 {
    30_000
}
fn default_interface_fallback() -> bool {
    true
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            probe_url: default_probe_url(),
            probe_timeout_ms: default_probe_timeout_ms(),
            interval_ms: default_interval_ms(),
            interface_fallback: default_interface_fallback(),
        }
    }
}

/// Execution profile per operation kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProfiles {
    #[serde(default = "ExecutionConfig::query")]
    pub query: ExecutionConfig,
    #[serde(default = "ExecutionConfig::mutation")]
    pub mutation: ExecutionConfig,
    #[serde(default = "ExecutionConfig::auth")]
    pub auth: ExecutionConfig,
    #[serde(default = "ExecutionConfig::generation")]
    pub generation: ExecutionConfig,
}

impl Default for ExecutionProfiles {
    fn default() -> Self {
        Self {
            query: ExecutionConfig::query(),
            mutation: ExecutionConfig::mutation(),
            auth: ExecutionConfig::auth(),
            generation: ExecutionConfig::generation(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub connectivity: ProberConfig,
    #[serde(default)]
    pub execution: ExecutionProfiles,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Settings directory: `$REMOTE_OPS_CONFIG_DIR` or `~/.remote-ops`
    pub fn config_dir() -> PathBuf {
        std::env::var(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::home_dir().unwrap_or_default().join(".remote-ops"))
    }

    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_dir().join(SETTINGS_FILE))
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = if path.exists() {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            Self::default()
        };

        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var(PROBE_URL_ENV) {
            self.connectivity.probe_url = url;
        }
        if let Ok(raw) = std::env::var(PROBE_INTERVAL_ENV) {
            self.connectivity.interval_ms =
                raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: PROBE_INTERVAL_ENV.to_string(),
                    reason: format!("expected milliseconds, got {:?}", raw),
                })?;
        }
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, reason: &str| ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if self.connectivity.probe_timeout_ms == 0 {
            return Err(invalid("connectivity.probe_timeout_ms", "must be greater than 0"));
        }
        if self.connectivity.interval_ms == 0 {
            return Err(invalid("connectivity.interval_ms", "must be greater than 0"));
        }
        for (key, profile) in [
            ("execution.query.timeout_ms", &self.execution.query),
            ("execution.mutation.timeout_ms", &self.execution.mutation),
            ("execution.auth.timeout_ms", &self.execution.auth),
            ("execution.generation.timeout_ms", &self.execution.generation),
        ] {
            if profile.timeout_ms == 0 {
                return Err(invalid(key, "must be greater than 0"));
            }
        }
        Ok(())
    }
}
