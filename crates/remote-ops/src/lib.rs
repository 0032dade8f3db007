//! Remote operation execution
//!
//! Decides, for every outbound call to an unreliable network, whether to
//! attempt it, how long to wait, when and how often to retry, how to
//! classify the failure, and how to expose a race-free state to callers.
//! Failed operations are re-driven automatically when connectivity returns.

pub mod config;
pub mod execution;
pub mod logging;
pub mod network;
pub mod progress;
pub mod service;

pub use config::{BackoffStrategy, ConfigError, ExecutionConfig, ProberConfig, Settings};
pub use execution::{
    classify, operation_fn, Classification, Classifier, ErrorClass, ExecutionOutcome, Failure,
    FailureCategory, FailureDetail, OperationContainer, OperationFn, OperationState, Phase,
    ReconnectCoordinator, RetryController,
};
pub use logging::{init_logging, LoggingConfig};
pub use network::{ConnectivityProber, ConnectivityStatus};
pub use service::{OperationKind, RemoteOps};
