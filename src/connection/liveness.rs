//! Liveness Monitor
//!
//! Periodically probes every registered connection and evicts the ones that
//! stopped talking. Probes are fire-and-forget: replies are observed by the
//! transport, which touches the connection and resets its missed-probe count.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::registry::ConnectionRegistry;
use super::types::ConnectionId;
use crate::config::LivenessConfig;

/// Why the monitor removed a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Already `Closing` or `Closed` when the sweep reached it
    NotOpen,
    /// No inbound traffic for longer than the idle timeout
    IdleTimeout,
    /// Too many consecutive probes went unanswered
    MissedProbes,
    /// The probe itself could not be written
    ProbeFailed,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NotOpen => "not open",
            Self::IdleTimeout => "idle timeout",
            Self::MissedProbes => "missed probes",
            Self::ProbeFailed => "probe write failed",
        };
        f.write_str(reason)
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub probed: usize,
    pub evicted: Vec<(ConnectionId, EvictionReason)>,
}

impl SweepReport {
    pub fn was_evicted(&self, id: &ConnectionId) -> bool {
        self.evicted.iter().any(|(evicted, _)| evicted == id)
    }
}

/// Periodic prober for registered connections
pub struct LivenessMonitor {
    registry: Arc<ConnectionRegistry>,
    config: LivenessConfig,
}

impl LivenessMonitor {
    pub fn new(registry: Arc<ConnectionRegistry>, config: LivenessConfig) -> Self {
        Self { registry, config }
    }

    /// Run one sweep against the current time
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now()).await
    }

    /// Run one sweep as if the current time were `now`
    pub async fn sweep_at(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();

        for connection in self.registry.snapshot().await {
            let reason = if !connection.is_open() {
                Some(EvictionReason::NotOpen)
            } else if connection.idle_for(now) > self.config.idle_timeout {
                Some(EvictionReason::IdleTimeout)
            } else if connection.missed_probes() > self.config.max_missed_probes {
                Some(EvictionReason::MissedProbes)
            } else if let Err(e) = connection.probe() {
                debug!(connection_id = %connection.id(), "Probe failed: {}", e);
                Some(EvictionReason::ProbeFailed)
            } else {
                report.probed += 1;
                None
            };

            if let Some(reason) = reason {
                connection.begin_closing();
                if self.registry.unregister(connection.id()).await {
                    warn!(
                        connection_id = %connection.id(),
                        remote_addr = %connection.remote_addr(),
                        "Evicting connection: {}",
                        reason
                    );
                    self.registry.metrics().connection_evicted();
                    report.evicted.push((connection.id().clone(), reason));
                }
            }
        }

        if !report.evicted.is_empty() {
            info!(
                "Liveness sweep evicted {} connections, probed {}",
                report.evicted.len(),
                report.probed
            );
        } else {
            debug!("Liveness sweep probed {} connections", report.probed);
        }
        report
    }

    /// Spawn the repeating sweep; it stops when `shutdown_rx` fires
    pub fn spawn(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.probe_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;

            info!(
                "Liveness monitor started (interval: {:?}, idle timeout: {:?})",
                self.config.probe_interval, self.config.idle_timeout
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.sweep().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Liveness monitor received shutdown signal");
                        break;
                    }
                }
            }
        })
    }
}
