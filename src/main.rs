//! NATS LED agent - Main Entry Point

use clap::{Parser, Subcommand};
use nats_led_agent::config::{AgentConfig, FatalPolicy};
use nats_led_agent::device::bind_device;
use nats_led_agent::net::{HostInterface, NetworkInterface};
use nats_led_agent::observability::init_default_logging;
use nats_led_agent::transport::TokioStack;
use nats_led_agent::AgentLifecycle;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// NATS-controlled LED agent
#[derive(Parser)]
#[command(name = "nats-led-agent")]
#[command(about = "Drive an output from NATS on/off/toggle commands")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent
    Run,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    info!("Starting nats-led-agent v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_agent(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<AgentConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(AgentConfig::load_from_file(path)?)
        }
        None => {
            for path_str in ["agent.toml", "config/agent.toml"] {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(AgentConfig::load_from_file(&path)?);
                }
            }

            info!("No configuration file found, using built-in defaults");
            let config = AgentConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Bootstrap: build the lifecycle with host collaborators injected
fn build_agent(
    config: AgentConfig,
) -> Result<AgentLifecycle<TokioStack>, Box<dyn std::error::Error>> {
    let route_probe = config.network.peer_socket_addr()?;
    let interface = HostInterface::detect(config.network.family, route_probe)
        .map(|iface| Arc::new(iface) as Arc<dyn NetworkInterface>);
    let device = bind_device(&config.device);

    Ok(AgentLifecycle::new(config, TokioStack, interface, device))
}

async fn run_agent(config: AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    let on_fatal = config.agent.on_fatal;
    let agent = build_agent(config)?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    let mut agent_task = tokio::spawn(agent.run());

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
            agent_task.abort();
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
            agent_task.abort();
            Ok(())
        }
        joined = &mut agent_task => {
            let halt = joined?;
            error!(
                phase = %halt.phase,
                kind = ?halt.error.kind(),
                error = %halt.error,
                "Agent halted"
            );

            match on_fatal {
                FatalPolicy::Exit => process::exit(halt.exit_code()),
                FatalPolicy::Park => {
                    warn!("Parking until a signal arrives");
                    tokio::select! {
                        _ = sigint.recv() => {}
                        _ = sigterm.recv() => {}
                    }
                    process::exit(halt.exit_code())
                }
            }
        }
    }
}

fn handle_config_command(
    config: &AgentConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Effective configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
