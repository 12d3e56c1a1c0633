//! Connection Registry
//!
//! Authoritative table of live connections. Every entry is `Open` or
//! `Closing`; a connection is marked `Closed` in the same step that removes
//! it from the map.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::types::{Connection, ConnectionId, ConnectionInfo, Outbound};
use crate::error::RelayError;
use crate::metrics::RelayMetrics;

/// Outcome of a single fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<ConnectionId>,
}

/// Registry of live client connections
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    max_connections: usize,
    accepting: AtomicBool,
    metrics: Arc<RelayMetrics>,
}

impl ConnectionRegistry {
    /// Create a new registry holding at most `max_connections` entries
    pub fn new(max_connections: usize, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_connections,
            accepting: AtomicBool::new(true),
            metrics,
        }
    }

    /// Store a new connection, making it visible to broadcast and liveness sweeps
    pub async fn register(&self, connection: Connection) -> Result<ConnectionId, RelayError> {
        let id = connection.id().clone();
        let addr = connection.remote_addr();
        {
            let mut connections = self.connections.write().await;
            if !self.accepting.load(Ordering::Acquire) {
                debug!(remote_addr = %addr, "Registry closed, rejecting connection");
                return Err(RelayError::ShuttingDown);
            }
            if connections.len() >= self.max_connections {
                warn!(
                    "Connection limit reached, rejecting connection from {}",
                    addr
                );
                return Err(RelayError::CapacityExceeded(self.max_connections));
            }
            match connections.entry(id.clone()) {
                Entry::Occupied(_) => {
                    warn!(connection_id = %id, "Duplicate connection id rejected");
                    return Err(RelayError::DuplicateConnection(id.to_string()));
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(connection));
                }
            }
        }

        self.metrics.connection_registered();
        info!(connection_id = %id, remote_addr = %addr, "Connection registered");
        Ok(id)
    }

    /// Remove a connection. Absent ids are a no-op; returns whether anything was removed.
    pub async fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = self.connections.write().await.remove(id);
        match removed {
            Some(connection) => {
                connection.mark_closed();
                connection.close_transport();
                self.metrics.connection_removed();
                info!(
                    connection_id = %id,
                    remote_addr = %connection.remote_addr(),
                    "Connection closed after {:?}",
                    connection.created_at().elapsed()
                );
                true
            }
            None => {
                debug!(connection_id = %id, "Unregister for unknown connection ignored");
                false
            }
        }
    }

    /// Move a connection to `Closing` and remove it
    pub async fn close(&self, id: &ConnectionId) -> bool {
        if let Some(connection) = self.get(id).await {
            connection.begin_closing();
        }
        self.unregister(id).await
    }

    /// Look up a connection
    pub async fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().await.get(id).cloned()
    }

    /// Consistent snapshot of all registered connections
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Record inbound activity for a connection
    pub async fn touch(&self, id: &ConnectionId) -> bool {
        match self.get(id).await {
            Some(connection) => {
                connection.touch();
                true
            }
            None => false,
        }
    }

    /// Send `payload` to every open connection.
    ///
    /// The map lock is released before any write. A failed write moves that
    /// connection to `Closing` and it is unregistered after the fan-out; the
    /// other connections still receive the payload.
    pub async fn broadcast(&self, payload: &str) -> BroadcastReport {
        let targets: Vec<Arc<Connection>> = self
            .connections
            .read()
            .await
            .values()
            .filter(|c| c.is_open())
            .cloned()
            .collect();

        let mut report = BroadcastReport::default();
        for connection in targets {
            match connection.send(Outbound::Text(payload.to_string())) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(connection_id = %connection.id(), "Broadcast write failed: {}", e);
                    self.metrics.write_failed();
                    connection.begin_closing();
                    report.failed.push(connection.id().clone());
                }
            }
        }

        for id in &report.failed {
            self.unregister(id).await;
        }

        debug!(
            delivered = report.delivered,
            failed = report.failed.len(),
            "Broadcast complete"
        );
        report
    }

    /// Send a frame to a single connection, evicting it if the write fails
    pub async fn send_to(&self, id: &ConnectionId, frame: Outbound) -> Result<(), RelayError> {
        let connection = self
            .get(id)
            .await
            .ok_or_else(|| RelayError::write_failure(id.as_str(), "connection not registered"))?;

        if let Err(e) = connection.send(frame) {
            warn!(connection_id = %id, "Write failed: {}", e);
            self.metrics.write_failed();
            self.close(id).await;
            return Err(e);
        }
        Ok(())
    }

    /// Serializable view of every registered connection
    pub async fn connection_infos(&self) -> Vec<ConnectionInfo> {
        self.connections
            .read()
            .await
            .values()
            .map(|c| c.info())
            .collect()
    }

    /// Stop accepting registrations, then close and remove every connection.
    /// Returns how many were removed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut connections = self.connections.write().await;
            self.accepting.store(false, Ordering::Release);
            connections.drain().map(|(_, c)| c).collect()
        };

        for connection in &drained {
            connection.begin_closing();
            connection.mark_closed();
            connection.close_transport();
            self.metrics.connection_removed();
        }

        if !drained.is_empty() {
            info!("Closed {} connections", drained.len());
        }
        drained.len()
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }
}
