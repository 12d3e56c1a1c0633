//! Periodic news broadcast

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::RelayEngine;
use crate::connection::BroadcastReport;
use crate::protocol::ServerMessage;

/// Pushes a fixed news message to every open connection on an interval
pub struct Announcer {
    engine: RelayEngine,
    message: String,
    interval: Duration,
}

impl Announcer {
    pub fn new(engine: RelayEngine, message: impl Into<String>, interval: Duration) -> Self {
        Self {
            engine,
            message: message.into(),
            interval,
        }
    }

    /// Broadcast the news message once
    pub async fn announce(&self) -> BroadcastReport {
        let report = self
            .engine
            .broadcast(&ServerMessage::News {
                message: self.message.clone(),
            })
            .await;
        debug!(delivered = report.delivered, "News announced");
        report
    }

    /// Spawn the repeating announcement; it stops when `shutdown_rx` fires
    pub fn spawn(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.tick().await;
            info!("Announcer started (interval: {:?})", self.interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.announce().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Announcer received shutdown signal");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ChannelSink, Connection, ConnectionRegistry, Outbound};
    use crate::metrics::RelayMetrics;
    use crate::storage::MemoryChatStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_announce_reaches_open_connections() {
        let registry = Arc::new(ConnectionRegistry::new(8, Arc::new(RelayMetrics::new())));
        let engine = RelayEngine::new(Arc::clone(&registry), Arc::new(MemoryChatStore::new()));
        let (sink, mut rx) = ChannelSink::channel(4);
        registry
            .register(Connection::new("127.0.0.1:9".parse().unwrap(), sink))
            .await
            .unwrap();

        let announcer = Announcer::new(engine, "Hello Socket.IO", Duration::from_secs(3));
        let report = announcer.announce().await;

        assert_eq!(report.delivered, 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Text(r#"{"type":"news","message":"Hello Socket.IO"}"#.into())
        );
    }
}
