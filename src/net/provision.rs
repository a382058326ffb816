//! Local endpoint provisioning
//!
//! Waits until the network interface holds a usable local address, either by
//! applying a static literal or by polling a dynamic acquisition until the
//! requested address is confirmed. Polling is bounded by [`PollPolicy`].

use super::address::{AddressError, AddressFamily, AddressResolver, Endpoint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// How the local address gets onto the interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningMode {
    #[default]
    Static,
    Dynamic,
}

/// Which dynamic acquisition step timed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionPhase {
    /// Waiting for the allocator to offer an address
    AwaitingOffer,
    /// Waiting for the interface to own the offered address
    AwaitingAssignment,
}

impl fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionPhase::AwaitingOffer => f.write_str("awaiting address offer"),
            ProvisionPhase::AwaitingAssignment => f.write_str("awaiting address assignment"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("No default network interface")]
    NoInterface,
    #[error("Provisioning timed out while {phase} after {polls} polls")]
    Timeout { phase: ProvisionPhase, polls: u32 },
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
    #[error("Interface error: {0}")]
    Interface(String),
}

/// Network interface operations the provisioner relies on
pub trait NetworkInterface: Send + Sync {
    fn name(&self) -> &str;

    /// Put a manually chosen address on the interface
    fn assign_static(&self, addr: IpAddr) -> Result<(), ProvisionError>;

    /// Start dynamic acquisition for `family`
    fn request_dynamic_address(&self, family: AddressFamily) -> Result<(), ProvisionError>;

    /// Address offered by the dynamic allocator, if any yet
    fn requested_address(&self, family: AddressFamily) -> Option<IpAddr>;

    /// Whether `addr` is confirmed as assigned to this interface
    fn owns_address(&self, addr: IpAddr) -> bool;
}

/// Polling cadence and ceiling for dynamic acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// 0 = poll forever
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_polls: 30,
        }
    }
}

impl PollPolicy {
    fn exhausted(&self, polls: u32) -> bool {
        self.max_polls != 0 && polls >= self.max_polls
    }
}

/// Interface confirmed usable, plus the endpoint to bind locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyEndpoint {
    pub interface: String,
    /// Never carries a port: the system picks the local port at bind time
    pub local: Endpoint,
}

pub struct EndpointProvisioner {
    family: AddressFamily,
    mode: ProvisioningMode,
    static_literal: String,
    policy: PollPolicy,
}

impl EndpointProvisioner {
    pub fn new(
        family: AddressFamily,
        mode: ProvisioningMode,
        static_literal: impl Into<String>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            family,
            mode,
            static_literal: static_literal.into(),
            policy,
        }
    }

    pub async fn ensure_ready(
        &self,
        interface: Option<&dyn NetworkInterface>,
    ) -> Result<ReadyEndpoint, ProvisionError> {
        info!("Initializing network");

        let interface = interface.ok_or(ProvisionError::NoInterface)?;

        let local = match (self.mode, self.family) {
            (ProvisioningMode::Static, _) => self.assign_static(interface)?,
            (ProvisioningMode::Dynamic, AddressFamily::Ipv4) => {
                self.acquire_dynamic(interface).await?
            }
            (ProvisioningMode::Dynamic, AddressFamily::Ipv6) => {
                warn!(
                    interface = interface.name(),
                    "Dynamic IPv6 acquisition is not supported, continuing with an unconfigured interface"
                );
                Endpoint::any(AddressFamily::Ipv6)
            }
        };

        info!(interface = interface.name(), local = %local, "Network ready");
        Ok(ReadyEndpoint {
            interface: interface.name().to_string(),
            local,
        })
    }

    fn assign_static(&self, interface: &dyn NetworkInterface) -> Result<Endpoint, ProvisionError> {
        let local = AddressResolver::resolve(self.family, Some(&self.static_literal), None)?;

        if let Some(addr) = local.address {
            interface.assign_static(addr)?;
        }

        Ok(local)
    }

    async fn acquire_dynamic(
        &self,
        interface: &dyn NetworkInterface,
    ) -> Result<Endpoint, ProvisionError> {
        interface.request_dynamic_address(self.family)?;

        info!("Waiting for DHCP ...");
        let mut polls = 0u32;
        let offered = loop {
            tokio::time::sleep(self.policy.interval).await;
            polls += 1;

            match interface.requested_address(self.family) {
                Some(addr) if !addr.is_unspecified() => break addr,
                _ if self.policy.exhausted(polls) => {
                    return Err(ProvisionError::Timeout {
                        phase: ProvisionPhase::AwaitingOffer,
                        polls,
                    })
                }
                _ => debug!(polls, "No address offered yet"),
            }
        };
        info!(address = %offered, "Done!");

        info!("Waiting for IP assignment ...");
        let mut polls = 0u32;
        loop {
            tokio::time::sleep(self.policy.interval).await;
            polls += 1;

            if interface.owns_address(offered) {
                break;
            }
            if self.policy.exhausted(polls) {
                return Err(ProvisionError::Timeout {
                    phase: ProvisionPhase::AwaitingAssignment,
                    polls,
                });
            }
            debug!(polls, address = %offered, "Address not assigned yet");
        }
        info!("Done!");

        Ok(Endpoint::from_addr(offered))
    }
}

/// The host's own network stack.
///
/// Address management belongs to the operating system here, so the
/// interface only observes: ownership is a bind probe and the "requested"
/// address is the source address the routing table picks toward the peer.
pub struct HostInterface {
    name: String,
    route_probe: SocketAddr,
}

impl HostInterface {
    /// Returns `None` when the host cannot open sockets of `family`
    pub fn detect(family: AddressFamily, route_probe: SocketAddr) -> Option<Self> {
        let any = SocketAddr::new(family.unspecified(), 0);
        match UdpSocket::bind(any) {
            Ok(_) => Some(Self {
                name: format!("host-{family}"),
                route_probe,
            }),
            Err(e) => {
                debug!(%family, error = %e, "No usable interface for family");
                None
            }
        }
    }
}

impl NetworkInterface for HostInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn assign_static(&self, addr: IpAddr) -> Result<(), ProvisionError> {
        if !self.owns_address(addr) {
            warn!(
                address = %addr,
                "Static address is not held by any host interface; binding to it will fail"
            );
        }
        Ok(())
    }

    fn request_dynamic_address(&self, family: AddressFamily) -> Result<(), ProvisionError> {
        debug!(%family, "Dynamic acquisition is handled by the host operating system");
        Ok(())
    }

    fn requested_address(&self, family: AddressFamily) -> Option<IpAddr> {
        let socket = UdpSocket::bind(SocketAddr::new(family.unspecified(), 0)).ok()?;
        socket.connect(self.route_probe).ok()?;
        let local = socket.local_addr().ok()?.ip();
        (!local.is_unspecified()).then_some(local)
    }

    fn owns_address(&self, addr: IpAddr) -> bool {
        UdpSocket::bind(SocketAddr::new(addr, 0)).is_ok()
    }
}
