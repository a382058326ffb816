//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.

use nats_led_agent::config::{AgentConfig, ConfigError, FatalPolicy};
use nats_led_agent::net::{AddressFamily, ProvisioningMode};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[agent]
name = "hallway"

[network]
family = "ipv4"
provisioning = "static"
local_address = "10.10.0.7"
peer_address = "10.10.0.1"
"#,
    );

    let config = AgentConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.agent.name, "hallway");
    assert_eq!(config.network.local_literal(), "10.10.0.7");
    assert_eq!(config.network.peer_literal(), "10.10.0.1");
    assert_eq!(config.network.port, 4222);
    assert_eq!(config.nats.connect_attempts, 1);
}

#[test]
fn test_config_loads_ipv6_dynamic_with_park() {
    let temp_file = write_config(
        r#"
[agent]
on_fatal = "park"

[network]
family = "inet6"
provisioning = "dynamic"
max_polls = 0
"#,
    );

    let config = AgentConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.agent.on_fatal, FatalPolicy::Park);
    assert_eq!(config.network.family, AddressFamily::Ipv6);
    assert_eq!(config.network.provisioning, ProvisioningMode::Dynamic);
    assert_eq!(config.network.peer_literal(), "2001:db8::2");
    assert_eq!(config.network.poll_policy().max_polls, 0);
}

#[test]
fn test_config_nats_section() {
    let temp_file = write_config(
        r#"
[nats]
connect_timeout_secs = 2
connect_attempts = 4
"#,
    );

    let config = AgentConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.connect_timeout(), Duration::from_secs(2));
    assert_eq!(config.retry_policy().max_attempts, 4);
}

#[test]
fn test_missing_file_is_file_read_error() {
    let result = AgentConfig::load_from_file(Path::new("/nonexistent/agent.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let temp_file = write_config("[network\nport = 4222");
    let result = AgentConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_wrong_type_is_parse_error() {
    let temp_file = write_config("[network]\nport = \"four\"");
    let result = AgentConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_unparsable_peer_is_rejected() {
    let temp_file = write_config("[network]\npeer_address = \"nats.local\"");
    let result = AgentConfig::load_from_file(temp_file.path());

    match result {
        Err(ConfigError::InvalidConfig(message)) => {
            assert!(message.contains("peer_address"), "{message}")
        }
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn test_credentials_resolved_from_environment() {
    let temp_file = write_config(
        r#"
[nats]
user_env = "NATS_LED_AGENT_IT_USER"
password_env = "NATS_LED_AGENT_IT_PASS"
"#,
    );
    std::env::set_var("NATS_LED_AGENT_IT_USER", "led");
    std::env::set_var("NATS_LED_AGENT_IT_PASS", "secret");

    let config = AgentConfig::load_from_file(temp_file.path()).unwrap();
    let options = config.connect_options().unwrap();

    assert_eq!(options.user.as_deref(), Some("led"));
    assert_eq!(options.pass.as_deref(), Some("secret"));
}
