//! Agent lifecycle: provision the network, bind the output, connect,
//! subscribe, then serve control messages until something fatal happens.
//!
//! [`AgentLifecycle::run`] never returns on success. Any terminal condition
//! comes back as a [`Halt`] naming the phase it happened in, and the caller
//! decides whether that means exiting or parking.

use crate::agent::dispatcher::{Dispatcher, CONTROL_SUBJECT, CONTROL_SUBSCRIPTION_ID};
use crate::config::AgentConfig;
use crate::device::{LedController, OutputDevice};
use crate::error::AgentError;
use crate::lifecycle_span;
use crate::net::{EndpointProvisioner, NetworkInterface, ReadyEndpoint};
use crate::transport::nats::{BusConnection, ConnectionError, NatsClient};
use crate::transport::{BusSession, TransportStack};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// Boot phases, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPhase {
    ProvisionNetwork,
    InitHardware,
    Connect,
    Subscribe,
    RunForever,
}

impl BootPhase {
    /// Process exit status for a halt in this phase
    pub fn exit_code(self) -> i32 {
        match self {
            BootPhase::ProvisionNetwork => 2,
            BootPhase::InitHardware => 3,
            BootPhase::Connect => 4,
            BootPhase::Subscribe => 5,
            BootPhase::RunForever => 6,
        }
    }
}

impl fmt::Display for BootPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootPhase::ProvisionNetwork => "provision-network",
            BootPhase::InitHardware => "init-hardware",
            BootPhase::Connect => "connect",
            BootPhase::Subscribe => "subscribe",
            BootPhase::RunForever => "run",
        };
        f.write_str(name)
    }
}

/// Terminal condition of the agent
#[derive(Debug)]
pub struct Halt {
    pub phase: BootPhase,
    pub error: AgentError,
}

impl Halt {
    fn new(phase: BootPhase, error: impl Into<AgentError>) -> Self {
        Self {
            phase,
            error: error.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.phase.exit_code()
    }
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "halted during {}: {}", self.phase, self.error)
    }
}

impl std::error::Error for Halt {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub struct AgentLifecycle<S> {
    config: AgentConfig,
    stack: S,
    interface: Option<Arc<dyn NetworkInterface>>,
    device: Option<Box<dyn OutputDevice>>,
}

impl<S> AgentLifecycle<S>
where
    S: TransportStack,
{
    /// Create a lifecycle with injected collaborators
    pub fn new(
        config: AgentConfig,
        stack: S,
        interface: Option<Arc<dyn NetworkInterface>>,
        device: Option<Box<dyn OutputDevice>>,
    ) -> Self {
        Self {
            config,
            stack,
            interface,
            device,
        }
    }

    /// Boot and serve until a terminal condition
    pub async fn run(self) -> Halt {
        let span = lifecycle_span!(agent = %self.config.agent.name);
        self.run_phases().instrument(span).await
    }

    async fn run_phases(self) -> Halt {
        let AgentLifecycle {
            config,
            stack,
            interface,
            device,
        } = self;

        info!(phase = %BootPhase::ProvisionNetwork, "Entering phase");
        let ready = match provision(&config, interface.as_deref()).await {
            Ok(ready) => ready,
            Err(e) => return Halt::new(BootPhase::ProvisionNetwork, e),
        };

        info!(phase = %BootPhase::InitHardware, "Entering phase");
        let mut dispatcher = Dispatcher::new(LedController::new(device));

        info!(phase = %BootPhase::Connect, "Entering phase");
        let options = match config.connect_options() {
            Ok(options) => options,
            Err(e) => return Halt::new(BootPhase::Connect, e),
        };
        let connection = BusConnection::new(
            stack,
            config.network.family,
            options,
            config.connect_timeout(),
        );
        let mut client = match connect_with_retry(&connection, &config, &ready).await {
            Ok(client) => client,
            Err(e) => return Halt::new(BootPhase::Connect, e),
        };

        info!(phase = %BootPhase::Subscribe, "Entering phase");
        if let Err(source) = client
            .subscribe(CONTROL_SUBJECT, None, CONTROL_SUBSCRIPTION_ID)
            .await
        {
            return Halt::new(
                BootPhase::Subscribe,
                AgentError::SubscribeFailed {
                    subject: CONTROL_SUBJECT.to_string(),
                    source,
                },
            );
        }
        info!(subject = CONTROL_SUBJECT, sid = CONTROL_SUBSCRIPTION_ID, "Subscribed");

        info!(phase = %BootPhase::RunForever, "Entering phase");
        Halt::new(BootPhase::RunForever, serve(&mut dispatcher, &mut client).await)
    }
}

async fn provision(
    config: &AgentConfig,
    interface: Option<&dyn NetworkInterface>,
) -> Result<ReadyEndpoint, AgentError> {
    let network = &config.network;
    let provisioner = EndpointProvisioner::new(
        network.family,
        network.provisioning,
        network.local_literal(),
        network.poll_policy(),
    );
    Ok(provisioner.ensure_ready(interface).await?)
}

async fn connect_with_retry<S>(
    connection: &BusConnection<S>,
    config: &AgentConfig,
    ready: &ReadyEndpoint,
) -> Result<NatsClient<S::Stream>, ConnectionError>
where
    S: TransportStack,
{
    let policy = config.retry_policy();
    let network = &config.network;
    let mut attempt = 1;

    loop {
        match connection
            .connect(&ready.local, network.peer_literal(), network.port)
            .await
        {
            Ok(client) => return Ok(client),
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Connect attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Dispatch messages in arrival order until the bus fails or closes
async fn serve<B>(dispatcher: &mut Dispatcher, bus: &mut B) -> AgentError
where
    B: BusSession + ?Sized,
{
    loop {
        let message = match bus.next_message().await {
            Ok(Some(message)) => message,
            Ok(None) => return AgentError::ConnectionClosed,
            Err(e) => return AgentError::Bus(e),
        };

        match dispatcher.on_message(&message, bus).await {
            Ok(_) => {}
            Err(e) if !e.is_fatal() => {
                warn!(subject = %message.subject, error = %e, "Ignoring message");
            }
            Err(e) => {
                error!(subject = %message.subject, error = %e, "Message handling failed");
                return e;
            }
        }
    }
}
