//! Graceful Shutdown Handling
//!
//! Listens for SIGTERM and SIGINT and broadcasts a single shutdown signal to
//! the HTTP server, the liveness monitor and the announcer.

use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::server::ServerHandle;
use crate::Result;

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    /// Broadcast sender for shutdown signal
    shutdown_tx: broadcast::Sender<()>,
    /// Shutdown timeout duration
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            timeout,
        }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Broadcast the shutdown signal to every subscriber
    pub fn trigger(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal: {}", e);
        }
    }

    /// Wait for SIGTERM, SIGINT or Ctrl+C
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        Ok(())
    }

    /// Signal shutdown, then close connections and join the server's tasks
    pub async fn shutdown_server(&self, handle: ServerHandle) -> Result<()> {
        let start_time = Instant::now();
        self.trigger();

        handle.wait_for_shutdown().await?;

        let elapsed = start_time.elapsed();
        if elapsed > self.timeout {
            warn!("Shutdown took {:?}, longer than the {:?} budget", elapsed, self.timeout);
        } else {
            info!("Shutdown finished in {:?}", elapsed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal_broadcast() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let mut first = coordinator.subscribe();
        let mut second = coordinator.subscribe();

        coordinator.trigger();

        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_trigger_without_subscribers_is_harmless() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        coordinator.trigger();
    }
}
