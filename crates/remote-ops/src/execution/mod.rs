//! Execution module
//!
//! Failure classification, the retry/backoff controller, per-call-site
//! state containers and reconnect-triggered re-drives.

mod classify;
mod error;
mod reconnect;
mod retry;
mod state;

pub use classify::*;
pub use error::*;
pub use reconnect::*;
pub use retry::*;
pub use state::*;
