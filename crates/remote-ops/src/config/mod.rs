pub mod execution;
pub mod settings;

pub use execution::{BackoffStrategy, ExecutionConfig};
pub use settings::{ConfigError, ExecutionProfiles, ProberConfig, Settings};
