//! Agent configuration
//!
//! Every section and field is optional. Defaults reproduce the stock
//! deployment: IPv4, static addressing with 192.168.0.1 locally, the NATS
//! server at 192.168.0.2:4222, fail-fast connect and no GPIO pin.

use crate::net::{AddressFamily, AddressResolver, PollPolicy, ProvisioningMode};
use crate::transport::nats::{ConnectOptions, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default NATS client port
pub const DEFAULT_PORT: u16 = 4222;

/// Main agent configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AgentConfig {
    pub agent: AgentSection,
    pub network: NetworkSection,
    pub nats: NatsSection,
    pub device: DeviceSection,
}

/// What `main` does once the agent reaches a terminal halt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FatalPolicy {
    /// Return the halt to the supervisor as a non-zero exit status
    #[default]
    Exit,
    /// Log and suspend forever, leaving restarts to a watchdog
    Park,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSection {
    /// Client name announced in CONNECT
    pub name: String,
    pub on_fatal: FatalPolicy,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: "nats-led-agent".to_string(),
            on_fatal: FatalPolicy::Exit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkSection {
    pub family: AddressFamily,
    pub provisioning: ProvisioningMode,
    /// Static local address; family default when absent
    pub local_address: Option<String>,
    /// NATS server address; family default when absent
    pub peer_address: Option<String>,
    pub port: u16,
    /// Dynamic acquisition poll interval
    pub poll_interval_ms: u64,
    /// Polls per dynamic acquisition phase, 0 = unbounded
    pub max_polls: u32,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            family: AddressFamily::Ipv4,
            provisioning: ProvisioningMode::Static,
            local_address: None,
            peer_address: None,
            port: DEFAULT_PORT,
            poll_interval_ms: 1000,
            max_polls: 30,
        }
    }
}

impl NetworkSection {
    pub fn local_literal(&self) -> &str {
        self.local_address
            .as_deref()
            .unwrap_or(match self.family {
                AddressFamily::Ipv4 => "192.168.0.1",
                AddressFamily::Ipv6 => "2001:db8::1",
            })
    }

    pub fn peer_literal(&self) -> &str {
        self.peer_address
            .as_deref()
            .unwrap_or(match self.family {
                AddressFamily::Ipv4 => "192.168.0.2",
                AddressFamily::Ipv6 => "2001:db8::2",
            })
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_polls: self.max_polls,
        }
    }

    /// Server socket address
    pub fn peer_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        AddressResolver::resolve(self.family, Some(self.peer_literal()), Some(self.port))
            .map(|endpoint| endpoint.to_socket_addr())
            .map_err(|e| ConfigError::InvalidConfig(format!("network.peer_address: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NatsSection {
    /// Environment variable containing username
    pub user_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    pub connect_timeout_secs: u64,
    /// Whole connect attempts before giving up, at least 1
    pub connect_attempts: u32,
}

impl Default for NatsSection {
    fn default() -> Self {
        Self {
            user_env: None,
            password_env: None,
            connect_timeout_secs: 10,
            connect_attempts: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceSection {
    /// BCM pin number of the output; absent = no hardware
    pub gpio_pin: Option<u8>,
    /// Output is lit when the pin is driven low
    pub active_low: bool,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            gpio_pin: None,
            active_low: true,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AgentConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "agent.name must not be empty".to_string(),
            ));
        }

        let network = &self.network;
        AddressResolver::resolve(network.family, Some(network.local_literal()), None)
            .map_err(|e| ConfigError::InvalidConfig(format!("network.local_address: {e}")))?;
        network.peer_socket_addr()?;

        if network.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "network.port must be non-zero".to_string(),
            ));
        }
        if network.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "network.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.nats.connect_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "nats.connect_attempts must be at least 1".to_string(),
            ));
        }
        if self.nats.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "nats.connect_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Helper method to get environment variable with error propagation
    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// CONNECT options with credentials resolved from the environment
    pub fn connect_options(&self) -> Result<ConnectOptions, ConfigError> {
        let options = ConnectOptions::new(self.agent.name.clone());

        match &self.nats.user_env {
            Some(user_env) => {
                let user = Self::get_env_var_required(user_env)?;
                let pass = self
                    .nats
                    .password_env
                    .as_ref()
                    .and_then(|name| std::env::var(name).ok())
                    .unwrap_or_default();
                Ok(options.with_credentials(user, pass))
            }
            None => Ok(options),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.nats.connect_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.nats.connect_attempts)
    }
}
