//! Scripted NATS server for driving a client over an in-memory stream
//!
//! The server side is written step by step by the test: every helper reads
//! or writes exactly the frames named, so an unexpected client frame shows
//! up as a failed expectation rather than a hang.

use crate::transport::nats::ConnectOptions;
use std::io;
use tokio::io::{
    split, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadHalf, WriteHalf,
};

pub const TEST_INFO: &str =
    "INFO {\"server_id\":\"scripted\",\"version\":\"2.10.0\",\"max_payload\":1048576,\"proto\":1}\r\n";

/// PUB frame as seen by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub subject: String,
    pub reply_to: Option<String>,
    pub payload: Vec<u8>,
}

pub struct ScriptedServer<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

fn protocol_error(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

impl<S> ScriptedServer<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S) -> Self {
        let (read, writer) = split(stream);
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    pub async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await
    }

    /// Next client line without its CRLF; empty once the client hung up
    pub async fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        self.reader.read_line(&mut line).await?;
        Ok(line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string())
    }

    async fn expect_line(&mut self, expected: &str) -> io::Result<()> {
        let line = self.read_line().await?;
        if line != expected {
            return Err(protocol_error(format!("expected {expected:?}, got {line:?}")));
        }
        Ok(())
    }

    /// INFO out, CONNECT + PING in, PONG out. Returns the CONNECT body.
    pub async fn accept_handshake(&mut self) -> io::Result<serde_json::Value> {
        self.send(TEST_INFO.as_bytes()).await?;

        let connect = self.read_line().await?;
        let body = connect
            .strip_prefix("CONNECT ")
            .ok_or_else(|| protocol_error(format!("expected CONNECT, got {connect:?}")))?;
        let body = serde_json::from_str(body).map_err(|e| protocol_error(e.to_string()))?;

        self.expect_line("PING").await?;
        self.send(b"PONG\r\n").await?;
        Ok(body)
    }

    /// SUB + PING in, PONG out. Returns the SUB arguments.
    pub async fn expect_subscription(&mut self) -> io::Result<Vec<String>> {
        let sub = self.read_line().await?;
        let args = sub
            .strip_prefix("SUB ")
            .ok_or_else(|| protocol_error(format!("expected SUB, got {sub:?}")))?
            .split_whitespace()
            .map(str::to_string)
            .collect();

        self.expect_line("PING").await?;
        self.send(b"PONG\r\n").await?;
        Ok(args)
    }

    /// Deliver a MSG frame
    pub async fn deliver(
        &mut self,
        subject: &str,
        sid: &str,
        reply_to: Option<&str>,
        payload: &[u8],
    ) -> io::Result<()> {
        let mut frame = match reply_to {
            Some(reply_to) => format!("MSG {subject} {sid} {reply_to} {}\r\n", payload.len()),
            None => format!("MSG {subject} {sid} {}\r\n", payload.len()),
        }
        .into_bytes();
        frame.extend_from_slice(payload);
        frame.extend_from_slice(b"\r\n");
        self.send(&frame).await
    }

    /// Read one PUB frame and its payload
    pub async fn read_publish(&mut self) -> io::Result<Publication> {
        let line = self.read_line().await?;
        let args: Vec<&str> = line
            .strip_prefix("PUB ")
            .ok_or_else(|| protocol_error(format!("expected PUB, got {line:?}")))?
            .split_whitespace()
            .collect();

        let (subject, reply_to, len) = match args.as_slice() {
            [subject, len] => (*subject, None, *len),
            [subject, reply_to, len] => (*subject, Some(reply_to.to_string()), *len),
            _ => return Err(protocol_error(format!("malformed PUB line {line:?}"))),
        };
        let len: usize = len
            .parse()
            .map_err(|_| protocol_error(format!("bad PUB length in {line:?}")))?;

        let mut payload = vec![0u8; len + 2];
        self.reader.read_exact(&mut payload).await?;
        payload.truncate(len);

        Ok(Publication {
            subject: subject.to_string(),
            reply_to,
            payload,
        })
    }

    /// Hang up both directions
    pub async fn close(mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Connect options tests hand to the client under test
pub fn test_connect_options() -> ConnectOptions {
    ConnectOptions::new("scripted-test")
}
