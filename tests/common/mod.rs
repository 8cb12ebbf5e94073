//! Integration test common infrastructure.
//!
//! Provides an instrumented in-memory server and transports that misbehave
//! in controlled ways.

pub mod harness;
pub mod transport;

#[allow(unused_imports)]
pub use harness::Harness;
#[allow(unused_imports)]
pub use transport::{MisreportingServer, SlowCountServer};
