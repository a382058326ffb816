//! Command interpretation for the control subject
//!
//! [`classify`] is the whole grammar: the subject must be exactly
//! [`CONTROL_SUBJECT`] and the payload exactly one of `on`, `off` or
//! `toggle`, compared byte for byte including length. No prefix, substring
//! or case-insensitive matching.

use crate::device::LedController;
use crate::error::AgentError;
use crate::transport::{BusSession, InboundMessage};
use tracing::{debug, info};

/// The only subject this agent answers on; also the device's topic name
pub const CONTROL_SUBJECT: &str = "led0";

/// Subscription identifier registered for [`CONTROL_SUBJECT`]
pub const CONTROL_SUBSCRIPTION_ID: &str = "sub132984012384098";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetOn,
    SetOff,
    Toggle,
    Unrecognized,
    UnknownSubject,
}

pub fn classify(subject: &str, payload: &[u8]) -> Command {
    if subject != CONTROL_SUBJECT {
        return Command::UnknownSubject;
    }

    match payload {
        b"on" => Command::SetOn,
        b"off" => Command::SetOff,
        b"toggle" => Command::Toggle,
        _ => Command::Unrecognized,
    }
}

/// Wire text for a device state
pub fn state_text(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// State report sent back to a requester
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Topic of the device that changed; the reply is published here
    pub topic: &'static str,
    /// Requester's reply subject, carried as the reply-to of the publish
    pub destination: String,
    pub payload: &'static str,
}

impl Reply {
    /// Publish on the device topic, addressed to the requester
    pub async fn send<B>(&self, bus: &mut B) -> Result<(), AgentError>
    where
        B: BusSession + ?Sized,
    {
        bus.publish(self.topic, Some(self.destination.as_str()), self.payload.as_bytes())
            .await
            .map_err(AgentError::Bus)
    }
}

/// Applies control commands to the output and reports the result
pub struct Dispatcher {
    led: LedController,
}

impl Dispatcher {
    pub fn new(led: LedController) -> Self {
        Self { led }
    }

    pub fn led(&self) -> &LedController {
        &self.led
    }

    /// Handle one inbound message. Returns the new output state for
    /// recognized commands.
    pub async fn on_message<B>(
        &mut self,
        message: &InboundMessage,
        bus: &mut B,
    ) -> Result<bool, AgentError>
    where
        B: BusSession + ?Sized,
    {
        let command = classify(&message.subject, &message.payload);
        debug!(
            subject = %message.subject,
            payload_len = message.payload_len(),
            ?command,
            "Dispatching message"
        );

        let target = match command {
            Command::SetOn => true,
            Command::SetOff => false,
            Command::Toggle => !self.led.read_state(),
            Command::Unrecognized => {
                return Err(AgentError::UnrecognizedCommand {
                    subject: message.subject.clone(),
                    payload_len: message.payload_len(),
                })
            }
            Command::UnknownSubject => {
                return Err(AgentError::UnknownSubject {
                    subject: message.subject.clone(),
                })
            }
        };

        self.led.write_state(target);
        info!(topic = CONTROL_SUBJECT, state = state_text(target), "Output updated");

        if let Some(reply) = Self::reply_for(message, target) {
            reply.send(bus).await?;
        }

        Ok(target)
    }

    /// Reply to publish for a state change, if the requester asked for one
    pub fn reply_for(message: &InboundMessage, state: bool) -> Option<Reply> {
        message.reply_to.as_ref().map(|destination| Reply {
            topic: CONTROL_SUBJECT,
            destination: destination.clone(),
            payload: state_text(state),
        })
    }
}
