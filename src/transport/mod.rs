//! Transport layer for bus communication
//!
//! This module provides the seams the agent core talks through: a
//! [`TransportStack`] that hands out stream contexts, and a [`BusSession`]
//! for subscribe/publish/receive once a session is established. The NATS
//! implementation lives in [`nats`].

use crate::net::AddressFamily;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream};

pub mod nats;

pub use nats::NatsError;

/// One message delivered by the bus, borrowed for a single dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub subject: String,
    pub sid: String,
    pub reply_to: Option<String>,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            sid: String::new(),
            reply_to: None,
            payload: payload.into(),
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Stream socket resources, acquired and bound before connecting.
///
/// `open` consumes the context: on success the returned stream owns it, on
/// failure it is dropped. Every other failure path hands the context back
/// through [`TransportStack::release`].
#[async_trait]
pub trait TransportStack: Send + Sync {
    type Context: Send;
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn acquire(&self, family: AddressFamily) -> io::Result<Self::Context>;

    fn bind(&self, context: &Self::Context, local: SocketAddr) -> io::Result<()>;

    async fn open(&self, context: Self::Context, remote: SocketAddr) -> io::Result<Self::Stream>;

    fn release(&self, context: Self::Context) {
        drop(context);
    }
}

/// Session operations the agent needs from the bus runtime
#[async_trait]
pub trait BusSession: Send {
    async fn subscribe(
        &mut self,
        subject: &str,
        queue_group: Option<&str>,
        sid: &str,
    ) -> Result<(), NatsError>;

    async fn publish(
        &mut self,
        subject: &str,
        reply_to: Option<&str>,
        payload: &[u8],
    ) -> Result<(), NatsError>;

    /// Block until the next message; `None` once the server closed the stream
    async fn next_message(&mut self) -> Result<Option<InboundMessage>, NatsError>;
}

/// TCP through the tokio socket API
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioStack;

#[async_trait]
impl TransportStack for TokioStack {
    type Context = TcpSocket;
    type Stream = TcpStream;

    fn acquire(&self, family: AddressFamily) -> io::Result<TcpSocket> {
        match family {
            AddressFamily::Ipv4 => TcpSocket::new_v4(),
            AddressFamily::Ipv6 => TcpSocket::new_v6(),
        }
    }

    fn bind(&self, context: &TcpSocket, local: SocketAddr) -> io::Result<()> {
        context.bind(local)
    }

    async fn open(&self, context: TcpSocket, remote: SocketAddr) -> io::Result<TcpStream> {
        let stream = context.connect(remote).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
