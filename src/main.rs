//! ChatRelay - Real-time WebSocket chat relay
//!
//! Persists chat messages and fans them out to every connected client while
//! probing connections and evicting the ones that stop responding.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::{config::ConfigManager, ChatServer, ShutdownCoordinator};

/// CLI arguments for ChatRelay
#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(about = "ChatRelay - Real-time WebSocket chat relay")]
#[command(version)]
#[command(long_about = "
ChatRelay - Real-time WebSocket chat relay

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  CHATRELAY_BIND_ADDR          - Bind address (e.g., 127.0.0.1:8005)
  CHATRELAY_MAX_CONNECTIONS    - Maximum concurrent connections
  CHATRELAY_PROBE_INTERVAL     - Liveness probe interval (e.g., 3s)
  CHATRELAY_IDLE_TIMEOUT       - Evict connections idle this long (e.g., 6s)
  CHATRELAY_STORAGE_BACKEND    - memory or jsonl
  CHATRELAY_STORAGE_PATH       - Path of the jsonl chat store
  CHATRELAY_LOG_LEVEL          - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "config.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "Bind address (e.g., 127.0.0.1:8005)")]
    pub bind: Option<String>,

    /// Port to bind to (overrides config file)
    #[arg(short, long, help = "Port to bind to")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Maximum number of concurrent connections
    #[arg(long, help = "Maximum number of concurrent connections")]
    pub max_connections: Option<usize>,

    /// Liveness probe interval in seconds
    #[arg(long, help = "Liveness probe interval in seconds")]
    pub probe_interval: Option<u64>,

    /// Enable periodic news broadcasts
    #[arg(long, help = "Enable periodic news broadcasts")]
    pub announce: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    config.merge_with_cli_args(
        args.bind.as_deref(),
        args.port,
        args.max_connections,
        args.probe_interval,
        args.announce,
    );

    init_tracing(&args, &config.logging.level)?;

    info!("Starting ChatRelay v{}", env!("CARGO_PKG_VERSION"));

    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Bind address: {}", config.server.bind_addr);
        info!("  WebSocket path: {}", config.server.ws_path);
        info!("  Max connections: {}", config.server.max_connections);
        info!("  Probe interval: {:?}", config.liveness.probe_interval);
        info!("  Idle timeout: {:?}", config.liveness.idle_timeout);
        info!("  Storage backend: {:?}", config.storage.backend);
        info!(
            "  Announcements: {}",
            if config.announce.enabled {
                "enabled"
            } else {
                "disabled"
            }
        );
        return Ok(());
    }

    let coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);

    let server = ChatServer::new(config).await?;
    let handle = server.start(&coordinator).await?;

    info!("ChatRelay started on {}", handle.local_addr());
    info!("Press Ctrl+C or send SIGTERM/SIGINT to shutdown gracefully");

    if let Err(e) = coordinator.listen_for_signals().await {
        error!("Error setting up signal handlers: {}", e);
    }

    info!("Initiating graceful shutdown...");
    coordinator.shutdown_server(handle).await?;
    info!("Server shutdown complete");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, configured_level: &str) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_deref().unwrap_or(configured_level)
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
