//! Endpoint composition from textual address literals
//!
//! Pure functions only: nothing in this module touches the network. An
//! [`Endpoint`] may leave its address or port unset, which renders as the
//! unspecified address and port 0 when turned into a socket address.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;

/// Address family used for every endpoint of one agent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[serde(alias = "v4", alias = "inet")]
    Ipv4,
    #[serde(alias = "v6", alias = "inet6")]
    Ipv6,
}

impl AddressFamily {
    /// The "any" address for this family
    pub fn unspecified(self) -> IpAddr {
        match self {
            AddressFamily::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    /// Family of an already parsed address
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    /// Parse a literal in this family's textual notation
    pub fn parse_literal(self, literal: &str) -> Result<IpAddr, AddressError> {
        let parsed = match self {
            AddressFamily::Ipv4 => literal.parse::<Ipv4Addr>().map(IpAddr::V4).ok(),
            AddressFamily::Ipv6 => literal.parse::<Ipv6Addr>().map(IpAddr::V6).ok(),
        };

        parsed.ok_or_else(|| AddressError::InvalidAddress {
            family: self,
            literal: literal.to_string(),
        })
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => f.write_str("ipv4"),
            AddressFamily::Ipv6 => f.write_str("ipv6"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Invalid {family} address: {literal}")]
    InvalidAddress {
        family: AddressFamily,
        literal: String,
    },
}

/// A possibly partial local or remote endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub family: AddressFamily,
    /// `None` means any/unspecified for the family
    pub address: Option<IpAddr>,
    /// `None` means unset; renders as port 0
    pub port: Option<u16>,
}

impl Endpoint {
    /// Fully unspecified endpoint of the given family
    pub fn any(family: AddressFamily) -> Self {
        Self {
            family,
            address: None,
            port: None,
        }
    }

    /// Endpoint carrying an already known address, port left unset
    pub fn from_addr(addr: IpAddr) -> Self {
        Self {
            family: AddressFamily::of(&addr),
            address: Some(addr),
            port: None,
        }
    }

    /// Apply an optional literal and an optional port onto this endpoint.
    ///
    /// The literal is parsed before anything is written, so on error the
    /// caller's endpoint is unchanged. A `None` port leaves the current port
    /// in place.
    pub fn compose(self, literal: Option<&str>, port: Option<u16>) -> Result<Self, AddressError> {
        let address = match literal {
            Some(literal) => Some(self.family.parse_literal(literal)?),
            None => self.address,
        };

        Ok(Self {
            family: self.family,
            address,
            port: port.or(self.port),
        })
    }

    /// Socket address for bind/connect calls
    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.address.unwrap_or_else(|| self.family.unspecified()),
            self.port.unwrap_or(0),
        )
    }

    pub fn is_unspecified(&self) -> bool {
        self.address.map_or(true, |addr| addr.is_unspecified())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_socket_addr())
    }
}

/// Turns (family, literal, port) tuples into endpoints
pub struct AddressResolver;

impl AddressResolver {
    /// Resolve a literal-or-absent host and an optional port for `family`
    pub fn resolve(
        family: AddressFamily,
        literal: Option<&str>,
        port: Option<u16>,
    ) -> Result<Endpoint, AddressError> {
        Endpoint::any(family).compose(literal, port)
    }

    /// Render an endpoint's address back to its canonical literal
    pub fn render(endpoint: &Endpoint) -> String {
        endpoint
            .address
            .unwrap_or_else(|| endpoint.family.unspecified())
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_ipv4_literal_with_port() {
        let endpoint =
            AddressResolver::resolve(AddressFamily::Ipv4, Some("192.168.0.2"), Some(4222))
                .unwrap();

        assert_eq!(endpoint.family, AddressFamily::Ipv4);
        assert_eq!(
            endpoint.to_socket_addr(),
            "192.168.0.2:4222".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_resolve_ipv6_literal() {
        let endpoint =
            AddressResolver::resolve(AddressFamily::Ipv6, Some("2001:db8::2"), Some(4222))
                .unwrap();

        assert_eq!(
            endpoint.to_socket_addr(),
            "[2001:db8::2]:4222".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_absent_host_means_unspecified() {
        let endpoint = AddressResolver::resolve(AddressFamily::Ipv6, None, Some(80)).unwrap();

        assert!(endpoint.address.is_none());
        assert!(endpoint.is_unspecified());
        assert_eq!(endpoint.to_socket_addr().ip(), Ipv6Addr::UNSPECIFIED);
    }

    #[test]
    fn test_absent_port_leaves_port_untouched() {
        let base = Endpoint {
            family: AddressFamily::Ipv4,
            address: None,
            port: Some(9000),
        };

        let composed = base.compose(Some("10.0.0.1"), None).unwrap();
        assert_eq!(composed.port, Some(9000));

        let fresh = AddressResolver::resolve(AddressFamily::Ipv4, Some("10.0.0.1"), None).unwrap();
        assert_eq!(fresh.port, None);
        assert_eq!(fresh.to_socket_addr().port(), 0);
    }

    #[test]
    fn test_malformed_literal_is_rejected() {
        let result = AddressResolver::resolve(AddressFamily::Ipv4, Some("192.168.0.300"), Some(1));

        assert_eq!(
            result,
            Err(AddressError::InvalidAddress {
                family: AddressFamily::Ipv4,
                literal: "192.168.0.300".to_string(),
            })
        );
    }

    #[test]
    fn test_family_mismatch_is_rejected() {
        assert!(AddressResolver::resolve(AddressFamily::Ipv6, Some("192.168.0.1"), None).is_err());
        assert!(AddressResolver::resolve(AddressFamily::Ipv4, Some("2001:db8::1"), None).is_err());
    }

    #[test]
    fn test_failed_compose_keeps_original() {
        let original = AddressResolver::resolve(AddressFamily::Ipv4, Some("10.1.1.1"), Some(7))
            .unwrap();

        let result = original.compose(Some("not-an-ip"), Some(8));
        assert!(result.is_err());
        assert_eq!(original.address, Some("10.1.1.1".parse().unwrap()));
        assert_eq!(original.port, Some(7));
    }

    #[test]
    fn test_canonical_literal_round_trip() {
        let cases = [
            (AddressFamily::Ipv4, "192.168.0.1"),
            (AddressFamily::Ipv4, "0.0.0.0"),
            (AddressFamily::Ipv6, "2001:db8::1"),
            (AddressFamily::Ipv6, "fe80::1:2"),
            (AddressFamily::Ipv6, "::"),
        ];

        for (family, literal) in cases {
            let endpoint = AddressResolver::resolve(family, Some(literal), None).unwrap();
            assert_eq!(AddressResolver::render(&endpoint), literal, "family {family}");
        }
    }

    #[test]
    fn test_family_deserializes_from_aliases() {
        #[derive(Deserialize)]
        struct Holder {
            family: AddressFamily,
        }

        let parsed: Holder = toml::from_str("family = \"ipv6\"").unwrap();
        assert_eq!(parsed.family, AddressFamily::Ipv6);
        let parsed: Holder = toml::from_str("family = \"v4\"").unwrap();
        assert_eq!(parsed.family, AddressFamily::Ipv4);
    }
}
