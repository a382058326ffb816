//! LED request utility
//!
//! Sends one command to a running agent and prints the state it reports
//! back. The agent answers on the control subject with our inbox as the
//! reply-to, so the tool listens there and picks out its own reply.
//!
//! ## Usage
//!
//! ```bash
//! # Flip the output and print the new state
//! led-request --server 192.168.0.2:4222 toggle
//!
//! # Payloads outside the grammar get no reply, so this times out
//! led-request --server 192.168.0.2:4222 --timeout-secs 2 blink
//! ```

use clap::Parser;
use nats_led_agent::bus_span;
use nats_led_agent::observability::init_default_logging;
use nats_led_agent::transport::nats::{ConnectOptions, NatsClient};
use nats_led_agent::transport::{BusSession, InboundMessage};
use std::net::SocketAddr;
use std::process;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, Instrument};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "led-request",
    about = "Send an on/off/toggle command to a nats-led-agent and print the reply"
)]
struct Args {
    /// NATS server address
    #[arg(long, default_value = "192.168.0.2:4222")]
    server: SocketAddr,

    /// Subject the agent listens on
    #[arg(long, default_value = "led0")]
    subject: String,

    /// Seconds to wait for the reply
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Command payload, sent verbatim
    payload: String,
}

async fn request(args: &Args) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let stream = TcpStream::connect(args.server).await?;
    let options = ConnectOptions::new(format!("led-request-{}", Uuid::new_v4()));
    let mut client = NatsClient::handshake(stream, &options).await?;

    let inbox = format!("_INBOX.{}", Uuid::new_v4().simple());
    client.subscribe(&args.subject, None, "1").await?;
    client
        .publish(&args.subject, Some(&inbox), args.payload.as_bytes())
        .await?;
    debug!(subject = %args.subject, %inbox, "Request published");

    let wait = Duration::from_secs(args.timeout_secs);
    let reply = match timeout(wait, wait_for_reply(&mut client, &inbox)).await {
        Ok(reply) => reply?,
        Err(_) => None,
    };

    client.close().await?;
    Ok(reply)
}

async fn wait_for_reply<B>(
    bus: &mut B,
    inbox: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>>
where
    B: BusSession,
{
    while let Some(message) = bus.next_message().await? {
        if is_reply_for(&message, inbox) {
            return Ok(Some(String::from_utf8_lossy(&message.payload).into_owned()));
        }
    }
    Ok(None)
}

/// Replies from other requesters share the subject, so match on reply-to
fn is_reply_for(message: &InboundMessage, inbox: &str) -> bool {
    message.reply_to.as_deref() == Some(inbox)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_default_logging(0);

    let span = bus_span!(op = "request", server = %args.server, subject = %args.subject);
    match request(&args).instrument(span).await {
        Ok(Some(state)) => println!("{} is {}", args.subject, state),
        Ok(None) => {
            eprintln!(
                "No reply on {} within {}s",
                args.subject, args.timeout_secs
            );
            process::exit(2);
        }
        Err(e) => {
            error!("Request failed: {}", e);
            process::exit(1);
        }
    }
}
