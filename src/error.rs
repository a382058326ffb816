//! Agent error taxonomy
//!
//! Module errors (addressing, provisioning, connection, bus, configuration)
//! are aggregated into [`AgentError`]. Boot-time errors are fatal; the two
//! command grammar errors are not and leave the connection open.

use crate::config::ConfigError;
use crate::net::{AddressError, ProvisionError};
use crate::transport::nats::{ConnectionError, NatsError};
use thiserror::Error;

/// Main error type for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    #[error("Network provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Could not connect to NATS server: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Could not subscribe to `{subject}` topic: {source}")]
    SubscribeFailed {
        subject: String,
        #[source]
        source: NatsError,
    },

    #[error("Bus error: {0}")]
    Bus(#[from] NatsError),

    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Invalid argument: a control-subject payload outside the grammar
    #[error("Unrecognized command on `{subject}` ({payload_len} byte payload)")]
    UnrecognizedCommand { subject: String, payload_len: usize },

    /// Not found: a subject this agent does not handle
    #[error("Unknown subject `{subject}`")]
    UnknownSubject { subject: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Stable names for the error taxonomy, independent of message text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidAddress,
    ContextUnavailable,
    BindFailed,
    ConnectFailed,
    SubscribeFailed,
    NoInterface,
    ProvisionTimeout,
    UnrecognizedCommand,
    UnknownSubject,
    ConnectionLost,
    Configuration,
}

impl AgentError {
    /// Only command grammar errors are recoverable
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AgentError::UnrecognizedCommand { .. } | AgentError::UnknownSubject { .. }
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::InvalidAddress(_) => ErrorKind::InvalidAddress,
            AgentError::Provision(e) => match e {
                ProvisionError::NoInterface | ProvisionError::Interface(_) => {
                    ErrorKind::NoInterface
                }
                ProvisionError::Timeout { .. } => ErrorKind::ProvisionTimeout,
                ProvisionError::InvalidAddress(_) => ErrorKind::InvalidAddress,
            },
            AgentError::Connection(e) => match e {
                ConnectionError::ContextUnavailable(_) => ErrorKind::ContextUnavailable,
                ConnectionError::BindFailed { .. } => ErrorKind::BindFailed,
                ConnectionError::InvalidAddress(_) => ErrorKind::InvalidAddress,
                ConnectionError::ConnectFailed { .. } => ErrorKind::ConnectFailed,
            },
            AgentError::SubscribeFailed { .. } => ErrorKind::SubscribeFailed,
            AgentError::Bus(_) | AgentError::ConnectionClosed => ErrorKind::ConnectionLost,
            AgentError::UnrecognizedCommand { .. } => ErrorKind::UnrecognizedCommand,
            AgentError::UnknownSubject { .. } => ErrorKind::UnknownSubject,
            AgentError::Config(_) => ErrorKind::Configuration,
        }
    }
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;
