//! Configuration Manager

use super::{Config, StorageBackend};
use crate::Result;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config = Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults",
                path.display()
            );
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Config> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Override fields from `CHATRELAY_*` variables supplied by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind_addr) = lookup("CHATRELAY_BIND_ADDR") {
            self.server.bind_addr = bind_addr
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid CHATRELAY_BIND_ADDR: {}", bind_addr))?;
        }

        if let Some(max_conn) = lookup("CHATRELAY_MAX_CONNECTIONS") {
            self.server.max_connections = max_conn
                .parse::<usize>()
                .with_context(|| format!("Invalid CHATRELAY_MAX_CONNECTIONS: {}", max_conn))?;
        }

        if let Some(interval) = lookup("CHATRELAY_PROBE_INTERVAL") {
            self.liveness.probe_interval = humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid CHATRELAY_PROBE_INTERVAL: {}", interval))?;
        }

        if let Some(idle) = lookup("CHATRELAY_IDLE_TIMEOUT") {
            self.liveness.idle_timeout = humantime::parse_duration(&idle)
                .with_context(|| format!("Invalid CHATRELAY_IDLE_TIMEOUT: {}", idle))?;
        }

        if let Some(backend) = lookup("CHATRELAY_STORAGE_BACKEND") {
            self.storage.backend = backend.parse::<StorageBackend>()?;
        }

        if let Some(path) = lookup("CHATRELAY_STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }

        if let Some(log_level) = lookup("CHATRELAY_LOG_LEVEL") {
            self.logging.level = log_level;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_liveness_config()
            .with_context(|| "Liveness configuration validation failed")?;

        self.validate_announce_config()
            .with_context(|| "Announce configuration validation failed")?;

        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            bail!("max_connections must be greater than 0");
        }

        if self.server.max_connections > 100000 {
            bail!("max_connections cannot exceed 100,000 for safety");
        }

        if self.server.send_queue_size == 0 {
            bail!("send_queue_size must be greater than 0");
        }

        if !self.server.ws_path.starts_with('/') {
            bail!("ws_path must start with '/'");
        }

        Ok(())
    }

    fn validate_liveness_config(&self) -> Result<()> {
        if self.liveness.probe_interval.is_zero() {
            bail!("probe_interval must be greater than 0");
        }

        if self.liveness.idle_timeout < self.liveness.probe_interval {
            bail!("idle_timeout must be at least one probe_interval");
        }

        Ok(())
    }

    fn validate_announce_config(&self) -> Result<()> {
        if self.announce.enabled {
            if self.announce.interval.is_zero() {
                bail!("announce.interval must be greater than 0");
            }
            if self.announce.message.is_empty() {
                bail!("announce.message must not be empty when announcing is enabled");
            }
        }

        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "logging.level must be one of: {}",
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        max_connections: Option<usize>,
        probe_interval: Option<u64>,
        announce: bool,
    ) {
        if let Some(bind_str) = bind {
            if let Ok(addr) = bind_str.parse::<SocketAddr>() {
                self.server.bind_addr = addr;
                tracing::info!("CLI override: bind address set to {}", addr);
            } else {
                tracing::warn!("Invalid bind address provided: {}", bind_str);
            }
        }

        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(max_conn) = max_connections {
            self.server.max_connections = max_conn;
            tracing::info!("CLI override: max connections set to {}", max_conn);
        }

        if let Some(secs) = probe_interval {
            let interval = std::time::Duration::from_secs(secs);
            self.liveness.probe_interval = interval;
            self.liveness.idle_timeout = interval * 2;
            tracing::info!("CLI override: probe interval set to {}s", secs);
        }

        if announce {
            self.announce.enabled = true;
            tracing::info!("CLI override: news announcements enabled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_probe_interval_rejected() {
        let mut config = Config::default();
        config.liveness.probe_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_idle_timeout_shorter_than_interval_rejected() {
        let mut config = Config::default();
        config.liveness.idle_timeout = Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CHATRELAY_BIND_ADDR", "0.0.0.0:9000"),
            ("CHATRELAY_PROBE_INTERVAL", "5s"),
            ("CHATRELAY_IDLE_TIMEOUT", "15s"),
            ("CHATRELAY_STORAGE_BACKEND", "jsonl"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.bind_addr.port(), 9000);
        assert_eq!(config.liveness.probe_interval, Duration::from_secs(5));
        assert_eq!(config.liveness.idle_timeout, Duration::from_secs(15));
        assert_eq!(config.storage.backend, StorageBackend::Jsonl);
    }

    #[test]
    fn test_invalid_env_value_reported() {
        let mut config = Config::default();
        let result = config.apply_env(|key| {
            (key == "CHATRELAY_MAX_CONNECTIONS").then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_probe_interval_scales_idle_timeout() {
        let mut config = Config::default();
        config.merge_with_cli_args(None, Some(9100), None, Some(10), true);

        assert_eq!(config.server.bind_addr.port(), 9100);
        assert_eq!(config.liveness.idle_timeout, Duration::from_secs(20));
        assert!(config.announce.enabled);
    }
}
