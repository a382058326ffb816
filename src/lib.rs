//! NATS LED agent
//!
//! A small control agent that brings up a network endpoint, connects to a
//! NATS server and drives a single output (`led0`) from `on`, `off` and
//! `toggle` commands, replying with the resulting state.
//!
//! # Overview
//!
//! - [`net`]: address resolution and local endpoint provisioning
//! - [`transport`]: transport stack seam and the NATS client
//! - [`device`]: output device abstraction and state owner
//! - [`agent`]: command dispatcher and boot lifecycle
//!
//! # Quick Start
//!
//! ```rust
//! use nats_led_agent::agent::{classify, Command};
//!
//! assert_eq!(classify("led0", b"toggle"), Command::Toggle);
//! assert_eq!(classify("led0", b"Toggle"), Command::Unrecognized);
//! assert_eq!(classify("led1", b"on"), Command::UnknownSubject);
//! ```

pub mod agent;
pub mod config;
pub mod device;
pub mod error;
pub mod net;
pub mod observability;
pub mod testing;
pub mod transport;

pub use agent::{AgentLifecycle, BootPhase, Halt};
pub use config::*;
pub use error::{AgentError, AgentResult, ErrorKind};
pub use transport::nats::NatsClient;
