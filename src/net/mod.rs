//! Local network readiness: address composition and endpoint provisioning

pub mod address;
pub mod provision;

pub use address::{AddressError, AddressFamily, AddressResolver, Endpoint};
pub use provision::{
    EndpointProvisioner, HostInterface, NetworkInterface, PollPolicy, ProvisionError,
    ProvisionPhase, ProvisioningMode, ReadyEndpoint,
};
