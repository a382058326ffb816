//! NATS session over an already connected byte stream
//!
//! The client owns the stream for its whole life. Every method takes
//! `&mut self`, so a session is driven by exactly one task.

use super::protocol::{
    encode_connect, encode_pub, encode_sub, parse_server_op, ConnectOptions, MsgHeader,
    ProtocolError, ServerInfo, ServerOp, CRLF, MAX_CONTROL_LINE, PING, PONG,
};
use crate::transport::{BusSession, InboundMessage};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::io::{
    split, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
    BufReader, ReadHalf, WriteHalf,
};
use tracing::{debug, trace, warn};

#[derive(Debug, Error)]
pub enum NatsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Expected {expected} from server, got {got}")]
    UnexpectedOperation { expected: &'static str, got: String },
    #[error("Payload of {size} bytes exceeds server maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("Connection closed by server")]
    Closed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct NatsClient<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    info: ServerInfo,
    pending: VecDeque<InboundMessage>,
}

impl<S> NatsClient<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    /// Run the client side of the connect handshake:
    /// INFO in, CONNECT + PING out, PONG in
    pub async fn handshake(stream: S, options: &ConnectOptions) -> Result<Self, NatsError> {
        let (read, writer) = split(stream);
        let mut reader = BufReader::new(read);

        let info = match read_op(&mut reader).await?.ok_or(NatsError::Closed)? {
            ServerOp::Info(info) => info,
            other => {
                return Err(NatsError::UnexpectedOperation {
                    expected: "INFO",
                    got: format!("{other:?}"),
                })
            }
        };
        debug!(
            server_id = %info.server_id,
            version = %info.version,
            max_payload = info.max_payload,
            "Received server INFO"
        );

        if info.auth_required && options.user.is_none() {
            warn!("Server requires authentication but no credentials are configured");
        }

        let mut client = Self {
            reader,
            writer,
            info,
            pending: VecDeque::new(),
        };

        client.write_frame(&encode_connect(options)?).await?;
        client.write_frame(PING).await?;
        client.await_pong().await?;

        Ok(client)
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.info
    }

    /// Flush and shut down the write side
    pub async fn close(mut self) -> Result<(), NatsError> {
        self.writer.shutdown().await?;
        Ok(())
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), NatsError> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_message(&mut self, header: MsgHeader) -> Result<InboundMessage, NatsError> {
        // The announced length is checked before anything is allocated
        let max = self.info.max_payload;
        let frame_len = match header.payload_len.checked_add(CRLF.len()) {
            Some(len) if header.payload_len <= max => len,
            _ => {
                return Err(NatsError::PayloadTooLarge {
                    size: header.payload_len,
                    max,
                })
            }
        };

        let mut payload = vec![0u8; frame_len];
        self.reader.read_exact(&mut payload).await?;

        if !payload.ends_with(CRLF) {
            return Err(ProtocolError::Malformed {
                op: "MSG",
                line: format!("payload for {} not CRLF terminated", header.subject),
            }
            .into());
        }
        payload.truncate(header.payload_len);

        Ok(InboundMessage {
            subject: header.subject,
            sid: header.sid,
            reply_to: header.reply_to,
            payload: Bytes::from(payload),
        })
    }

    /// Wait for the PONG answering our last PING, queueing any messages
    /// delivered in the meantime
    async fn await_pong(&mut self) -> Result<(), NatsError> {
        loop {
            match read_op(&mut self.reader).await?.ok_or(NatsError::Closed)? {
                ServerOp::Pong => return Ok(()),
                ServerOp::Ok => continue,
                ServerOp::Ping => self.write_frame(PONG).await?,
                ServerOp::Err(message) => return Err(NatsError::Server(message)),
                ServerOp::Info(info) => self.info = info,
                ServerOp::Msg(header) => {
                    let message = self.read_message(header).await?;
                    self.pending.push_back(message);
                }
            }
        }
    }
}

#[async_trait]
impl<S> BusSession for NatsClient<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    async fn subscribe(
        &mut self,
        subject: &str,
        queue_group: Option<&str>,
        sid: &str,
    ) -> Result<(), NatsError> {
        let frame = encode_sub(subject, queue_group, sid)?;
        self.write_frame(&frame).await?;
        self.write_frame(PING).await?;
        self.await_pong().await
    }

    async fn publish(
        &mut self,
        subject: &str,
        reply_to: Option<&str>,
        payload: &[u8],
    ) -> Result<(), NatsError> {
        if payload.len() > self.info.max_payload {
            return Err(NatsError::PayloadTooLarge {
                size: payload.len(),
                max: self.info.max_payload,
            });
        }

        let frame = encode_pub(subject, reply_to, payload)?;
        self.write_frame(&frame).await
    }

    async fn next_message(&mut self) -> Result<Option<InboundMessage>, NatsError> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(Some(message));
        }

        loop {
            let Some(op) = read_op(&mut self.reader).await? else {
                return Ok(None);
            };

            match op {
                ServerOp::Msg(header) => return self.read_message(header).await.map(Some),
                ServerOp::Ping => {
                    trace!("Answering server PING");
                    self.write_frame(PONG).await?;
                }
                ServerOp::Pong | ServerOp::Ok => continue,
                ServerOp::Info(info) => self.info = info,
                ServerOp::Err(message) => return Err(NatsError::Server(message)),
            }
        }
    }
}

/// Read one control line of at most [`MAX_CONTROL_LINE`] bytes; `None` on a
/// clean end of stream
async fn read_op<R>(reader: &mut R) -> Result<Option<ServerOp>, NatsError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = (&mut *reader)
            .take(MAX_CONTROL_LINE as u64)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        if read == MAX_CONTROL_LINE && !line.ends_with(b"\n") {
            return Err(ProtocolError::LineTooLong {
                limit: MAX_CONTROL_LINE,
            }
            .into());
        }
        // tolerate stray blank lines between operations
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }
        break;
    }

    let text = String::from_utf8(line).map_err(|e| ProtocolError::Malformed {
        op: "control",
        line: String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })?;
    trace!(line = %text.trim_end(), "<<");
    Ok(Some(parse_server_op(&text)?))
}
