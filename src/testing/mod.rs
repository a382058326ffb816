//! Testing utilities and mock implementations
//!
//! In-memory stand-ins for the network interface, the output device, the
//! transport stack and the NATS server, so the agent can be exercised
//! without sockets or hardware.

pub mod mocks;
pub mod server;

pub use mocks::*;
pub use server::{test_connect_options, Publication, ScriptedServer};
