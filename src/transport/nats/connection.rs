//! Connection establishment: acquire, bind, resolve, open, handshake
//!
//! Exactly one transport context is acquired per attempt, and every failure
//! path releases it before returning.

use super::client::{NatsClient, NatsError};
use super::protocol::ConnectOptions;
use crate::bus_span;
use crate::net::{AddressError, AddressFamily, AddressResolver, Endpoint};
use crate::transport::TransportStack;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, Instrument};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Could not get new transport context: {0}")]
    ContextUnavailable(#[source] io::Error),
    #[error("Could not bind to local address {local}: {source}")]
    BindFailed {
        local: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
    #[error("Could not connect to {remote}: {source}")]
    ConnectFailed {
        remote: SocketAddr,
        #[source]
        source: HandshakeError,
    },
}

/// Why opening the stream or the session handshake failed
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Session(#[from] NatsError),
    #[error("handshake timed out after {0:?}")]
    TimedOut(Duration),
}

impl ConnectionError {
    fn connect_failed(remote: SocketAddr, source: impl Into<HandshakeError>) -> Self {
        Self::ConnectFailed {
            remote,
            source: source.into(),
        }
    }
}

/// Retry schedule for whole connect attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delays in milliseconds before attempts 2, 3, ...
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_pattern: vec![250, 500, 1000, 2000],
            sustained_delay: 5000,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let index = retry.saturating_sub(1) as usize;
        let millis = self
            .backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay);
        Duration::from_millis(millis)
    }
}

/// Connects one bus session through a [`TransportStack`]
pub struct BusConnection<S> {
    stack: S,
    family: AddressFamily,
    options: ConnectOptions,
    timeout: Duration,
}

impl<S> BusConnection<S>
where
    S: TransportStack,
{
    pub fn new(stack: S, family: AddressFamily, options: ConnectOptions, timeout: Duration) -> Self {
        Self {
            stack,
            family,
            options,
            timeout,
        }
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub async fn connect(
        &self,
        local: &Endpoint,
        peer: &str,
        port: u16,
    ) -> Result<NatsClient<S::Stream>, ConnectionError> {
        info!("Connecting...");

        let context = self
            .stack
            .acquire(self.family)
            .map_err(ConnectionError::ContextUnavailable)?;

        let local = local.to_socket_addr();
        if let Err(source) = self.stack.bind(&context, local) {
            debug!(%local, error = %source, "Could not bind to local address");
            self.stack.release(context);
            return Err(ConnectionError::BindFailed { local, source });
        }

        let remote = match AddressResolver::resolve(self.family, Some(peer), Some(port)) {
            Ok(endpoint) => endpoint.to_socket_addr(),
            Err(e) => {
                self.stack.release(context);
                return Err(e.into());
            }
        };

        // From here on the context belongs to `open`, and then to the stream,
        // so dropping either releases it.
        let handshake = async {
            let stream = self.stack.open(context, remote).await?;
            NatsClient::handshake(stream, &self.options).await
        }
        .instrument(bus_span!(op = "handshake", %remote));
        let session = tokio::time::timeout(self.timeout, handshake).await;

        match session {
            Ok(Ok(client)) => {
                info!(%local, %remote, server = %client.server_info().server_id, "Connected");
                Ok(client)
            }
            Ok(Err(e)) => Err(ConnectionError::connect_failed(remote, e)),
            Err(_) => Err(ConnectionError::connect_failed(
                remote,
                HandshakeError::TimedOut(self.timeout),
            )),
        }
    }
}
