//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub liveness: LivenessConfig,
    pub announce: AnnounceConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub ws_path: String,
    pub max_connections: usize,
    /// Outbound frames buffered per connection before writes start failing
    pub send_queue_size: usize,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Liveness probing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LivenessConfig {
    #[serde(with = "humantime_serde")]
    pub probe_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    pub max_missed_probes: u32,
}

/// Periodic news broadcast configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnnounceConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub message: String,
}

/// Chat persistence configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

/// Available chat store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Jsonl,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "jsonl" => Ok(Self::Jsonl),
            other => anyhow::bail!("unknown storage backend '{}'", other),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        let probe_interval = Duration::from_secs(3);
        Self {
            probe_interval,
            idle_timeout: probe_interval * 2,
            max_missed_probes: 1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: SocketAddr::from(([127, 0, 0, 1], 8005)),
                ws_path: "/ws".to_string(),
                max_connections: 1000,
                send_queue_size: 64,
                shutdown_timeout: Duration::from_secs(10),
            },
            liveness: LivenessConfig::default(),
            announce: AnnounceConfig {
                enabled: false,
                interval: Duration::from_secs(3),
                message: "send Msg from server to client.".to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                path: PathBuf::from("data/chats.jsonl"),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}
