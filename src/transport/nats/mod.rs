//! NATS client subset used by the agent
//!
//! This module is split into three focused sub-modules:
//!
//! - [`protocol`] - Pure encoding and parsing of protocol lines
//! - [`client`] - Session I/O over a connected stream (handshake, SUB, PUB, MSG)
//! - [`connection`] - Context acquisition, binding and connect sequencing
//!
//! # Usage
//!
//! ```rust,no_run
//! use nats_led_agent::net::{AddressFamily, Endpoint};
//! use nats_led_agent::transport::nats::{BusConnection, ConnectOptions};
//! use nats_led_agent::transport::{BusSession, TokioStack};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let connection = BusConnection::new(
//!     TokioStack,
//!     AddressFamily::Ipv4,
//!     ConnectOptions::new("my-agent"),
//!     Duration::from_secs(10),
//! );
//! let mut client = connection
//!     .connect(&Endpoint::any(AddressFamily::Ipv4), "127.0.0.1", 4222)
//!     .await?;
//! client.subscribe("led0", None, "sub1").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod protocol;

pub use client::{NatsClient, NatsError};
pub use connection::{BusConnection, ConnectionError, HandshakeError, RetryPolicy};
pub use protocol::{ConnectOptions, ServerInfo};
