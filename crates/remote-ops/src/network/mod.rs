//! Network layer
//!
//! Connectivity probing and deadline-bounded execution

mod connectivity;
mod probe;
mod timeout;

pub use connectivity::*;
pub use probe::*;
pub use timeout::*;

#[cfg(test)]
mod tests;
