//! Pure NATS text protocol encoding and parsing
//!
//! Only the client subset the agent speaks is covered. Control lines are
//! CRLF terminated; `MSG` lines are followed by a payload of the announced
//! length plus a trailing CRLF, which the reader consumes separately.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRLF: &[u8] = b"\r\n";
pub const PING: &[u8] = b"PING\r\n";
pub const PONG: &[u8] = b"PONG\r\n";

/// Payload limit assumed until the server announces its own
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Longest control line the reader accepts, CRLF included
pub const MAX_CONTROL_LINE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Empty protocol line")]
    EmptyLine,
    #[error("Unknown protocol operation: {0}")]
    UnknownOperation(String),
    #[error("Malformed {op} line: {line}")]
    Malformed { op: &'static str, line: String },
    #[error("Control line longer than {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("Invalid subject: {0:?}")]
    InvalidSubject(String),
    #[error("Invalid server INFO: {0}")]
    InvalidInfo(String),
}

/// Fields of the server INFO block the client uses
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,
    #[serde(default)]
    pub auth_required: bool,
    #[serde(default)]
    pub proto: u8,
}

fn default_max_payload() -> usize {
    DEFAULT_MAX_PAYLOAD
}

/// Body of the CONNECT operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectOptions {
    pub verbose: bool,
    pub pedantic: bool,
    pub tls_required: bool,
    pub name: String,
    pub lang: String,
    pub version: String,
    pub protocol: u8,
    pub echo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
}

impl ConnectOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            verbose: false,
            pedantic: false,
            tls_required: false,
            name: name.into(),
            lang: "rust".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol: 1,
            // replies go out on the subscribed subject
            echo: false,
            user: None,
            pass: None,
        }
    }

    pub fn with_credentials(mut self, user: String, pass: String) -> Self {
        self.user = Some(user);
        self.pass = Some(pass);
        self
    }
}

/// Header of an inbound MSG; the payload follows on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgHeader {
    pub subject: String,
    pub sid: String,
    pub reply_to: Option<String>,
    pub payload_len: usize,
}

/// One parsed server-to-client control line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerOp {
    Info(ServerInfo),
    Msg(MsgHeader),
    Ping,
    Pong,
    Ok,
    Err(String),
}

/// Subjects must be non-empty and free of whitespace
pub fn validate_subject(subject: &str) -> Result<(), ProtocolError> {
    if subject.is_empty() || subject.chars().any(char::is_whitespace) {
        return Err(ProtocolError::InvalidSubject(subject.to_string()));
    }
    Ok(())
}

/// Parse one control line, with or without its trailing CRLF
pub fn parse_server_op(line: &str) -> Result<ServerOp, ProtocolError> {
    let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
    let (op, rest) = match line.split_once(|c: char| c == ' ' || c == '\t') {
        Some((op, rest)) => (op, rest.trim()),
        None => (line, ""),
    };

    if op.is_empty() {
        return Err(ProtocolError::EmptyLine);
    }

    match op.to_ascii_uppercase().as_str() {
        "INFO" => serde_json::from_str(rest)
            .map(ServerOp::Info)
            .map_err(|e| ProtocolError::InvalidInfo(e.to_string())),
        "MSG" => parse_msg_args(rest).map(ServerOp::Msg).ok_or_else(|| ProtocolError::Malformed {
            op: "MSG",
            line: line.to_string(),
        }),
        "PING" => Ok(ServerOp::Ping),
        "PONG" => Ok(ServerOp::Pong),
        "+OK" => Ok(ServerOp::Ok),
        "-ERR" => Ok(ServerOp::Err(rest.trim_matches('\'').to_string())),
        other => Err(ProtocolError::UnknownOperation(other.to_string())),
    }
}

fn parse_msg_args(args: &str) -> Option<MsgHeader> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    let (subject, sid, reply_to, len) = match parts.as_slice() {
        [subject, sid, len] => (*subject, *sid, None, *len),
        [subject, sid, reply_to, len] => (*subject, *sid, Some(*reply_to), *len),
        _ => return None,
    };

    Some(MsgHeader {
        subject: subject.to_string(),
        sid: sid.to_string(),
        reply_to: reply_to.map(str::to_string),
        payload_len: len.parse().ok()?,
    })
}

pub fn encode_connect(options: &ConnectOptions) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_string(options)?;
    Ok(format!("CONNECT {body}\r\n").into_bytes())
}

pub fn encode_sub(
    subject: &str,
    queue_group: Option<&str>,
    sid: &str,
) -> Result<Vec<u8>, ProtocolError> {
    validate_subject(subject)?;
    validate_subject(sid)?;

    let line = match queue_group {
        Some(queue) => {
            validate_subject(queue)?;
            format!("SUB {subject} {queue} {sid}\r\n")
        }
        None => format!("SUB {subject} {sid}\r\n"),
    };
    Ok(line.into_bytes())
}

pub fn encode_pub(
    subject: &str,
    reply_to: Option<&str>,
    payload: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    validate_subject(subject)?;

    let header = match reply_to {
        Some(reply_to) => {
            validate_subject(reply_to)?;
            format!("PUB {subject} {reply_to} {}\r\n", payload.len())
        }
        None => format!("PUB {subject} {}\r\n", payload.len()),
    };

    let mut frame = Vec::with_capacity(header.len() + payload.len() + CRLF.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(CRLF);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info() {
        let line = r#"INFO {"server_id":"NABC","version":"2.10.1","max_payload":4096,"proto":1}"#;

        match parse_server_op(line).unwrap() {
            ServerOp::Info(info) => {
                assert_eq!(info.server_id, "NABC");
                assert_eq!(info.version, "2.10.1");
                assert_eq!(info.max_payload, 4096);
                assert!(!info.auth_required);
            }
            other => panic!("expected INFO, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_info_defaults_missing_fields() {
        match parse_server_op("INFO {}\r\n").unwrap() {
            ServerOp::Info(info) => assert_eq!(info.max_payload, DEFAULT_MAX_PAYLOAD),
            other => panic!("expected INFO, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_info_rejects_bad_json() {
        assert!(matches!(
            parse_server_op("INFO {not json"),
            Err(ProtocolError::InvalidInfo(_))
        ));
    }

    #[test]
    fn test_parse_msg_without_reply() {
        let op = parse_server_op("MSG led0 sub1 2\r\n").unwrap();
        assert_eq!(
            op,
            ServerOp::Msg(MsgHeader {
                subject: "led0".to_string(),
                sid: "sub1".to_string(),
                reply_to: None,
                payload_len: 2,
            })
        );
    }

    #[test]
    fn test_parse_msg_with_reply() {
        let op = parse_server_op("MSG led0 sub132984012384098 _INBOX.abc 6").unwrap();
        match op {
            ServerOp::Msg(header) => {
                assert_eq!(header.reply_to.as_deref(), Some("_INBOX.abc"));
                assert_eq!(header.payload_len, 6);
            }
            other => panic!("expected MSG, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_msg_malformed() {
        assert!(matches!(
            parse_server_op("MSG led0"),
            Err(ProtocolError::Malformed { op: "MSG", .. })
        ));
        assert!(matches!(
            parse_server_op("MSG led0 1 two"),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_simple_ops_case_insensitive() {
        assert_eq!(parse_server_op("PING\r\n").unwrap(), ServerOp::Ping);
        assert_eq!(parse_server_op("pong").unwrap(), ServerOp::Pong);
        assert_eq!(parse_server_op("+OK").unwrap(), ServerOp::Ok);
    }

    #[test]
    fn test_parse_err_strips_quotes() {
        assert_eq!(
            parse_server_op("-ERR 'Authorization Violation'\r\n").unwrap(),
            ServerOp::Err("Authorization Violation".to_string())
        );
    }

    #[test]
    fn test_parse_unknown_and_empty() {
        assert!(matches!(
            parse_server_op("HELLO world"),
            Err(ProtocolError::UnknownOperation(_))
        ));
        assert_eq!(parse_server_op("\r\n"), Err(ProtocolError::EmptyLine));
    }

    #[test]
    fn test_encode_pub() {
        assert_eq!(encode_pub("led0", None, b"on").unwrap(), b"PUB led0 2\r\non\r\n");
        assert_eq!(
            encode_pub("led0", Some("_INBOX.1"), b"toggle").unwrap(),
            b"PUB led0 _INBOX.1 6\r\ntoggle\r\n"
        );
        assert_eq!(encode_pub("empty", None, b"").unwrap(), b"PUB empty 0\r\n\r\n");
    }

    #[test]
    fn test_encode_sub() {
        assert_eq!(encode_sub("led0", None, "sid1").unwrap(), b"SUB led0 sid1\r\n");
        assert_eq!(
            encode_sub("led0", Some("workers"), "sid1").unwrap(),
            b"SUB led0 workers sid1\r\n"
        );
    }

    #[test]
    fn test_subject_validation() {
        assert!(encode_pub("", None, b"x").is_err());
        assert!(encode_pub("bad subject", None, b"x").is_err());
        assert!(encode_sub("led0", None, "sid with space").is_err());
        assert!(validate_subject("led0.status").is_ok());
    }

    #[test]
    fn test_encode_connect_omits_absent_credentials() {
        let frame = encode_connect(&ConnectOptions::new("agent")).unwrap();
        let text = String::from_utf8(frame).unwrap();

        assert!(text.starts_with("CONNECT {"));
        assert!(text.ends_with("}\r\n"));
        assert!(text.contains(r#""verbose":false"#));
        assert!(text.contains(r#""name":"agent""#));
        assert!(text.contains(r#""echo":false"#));
        assert!(!text.contains("user"));
    }

    #[test]
    fn test_encode_connect_with_credentials() {
        let options =
            ConnectOptions::new("agent").with_credentials("alice".to_string(), "pw".to_string());
        let text = String::from_utf8(encode_connect(&options).unwrap()).unwrap();

        assert!(text.contains(r#""user":"alice""#));
        assert!(text.contains(r#""pass":"pw""#));
    }
}
