//! Relay Engine
//!
//! Handles inbound application payloads: decode, persist, then fan out
//! through the registry.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::connection::{BroadcastReport, ConnectionId, ConnectionRegistry, Outbound};
use crate::error::RelayError;
use crate::protocol::{decode_client_message, ClientMessage, ServerMessage};
use crate::storage::{ChatRecord, ChatStore, NewChat};

/// Routes inbound chat messages to the store and back out to every client
#[derive(Clone)]
pub struct RelayEngine {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn ChatStore>,
}

impl RelayEngine {
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn ChatStore>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    /// Handle one inbound text frame.
    ///
    /// A malformed payload gets an error frame and closes the connection; the
    /// violation is returned so the transport stops reading. Persistence
    /// failures are logged and the message is relayed anyway.
    #[instrument(skip(self, text), fields(connection_id = %id))]
    pub async fn handle_inbound(&self, id: &ConnectionId, text: &str) -> Result<(), RelayError> {
        self.registry.touch(id).await;

        let message = match decode_client_message(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Closing connection after malformed payload: {}", e);
                self.registry.metrics().protocol_violation();
                self.send_error(id, &e.to_string()).await;
                self.registry.close(id).await;
                return Err(e);
            }
        };

        match message {
            ClientMessage::Chat(chat) => {
                self.relay_chat(chat.into()).await;
            }
            ClientMessage::Reply { data } => {
                info!(reply = %data, "Client reply");
            }
        }
        Ok(())
    }

    /// Persist a chat message and broadcast it
    pub async fn relay_chat(&self, chat: NewChat) -> BroadcastReport {
        let record = match self.store.save(chat.clone()).await {
            Ok(record) => {
                debug!(chat_id = %record.id, room = %record.room, "Chat persisted");
                record
            }
            Err(e) => {
                error!(room = %chat.room, "Failed to persist chat: {}", e);
                self.registry.metrics().persistence_failed();
                ChatRecord::from_new(chat)
            }
        };

        let report = self.broadcast(&ServerMessage::Chat(record)).await;
        self.registry.metrics().message_relayed();
        report
    }

    /// Encode and broadcast a server message
    pub async fn broadcast(&self, message: &ServerMessage) -> BroadcastReport {
        match message.to_json() {
            Ok(payload) => self.registry.broadcast(&payload).await,
            Err(e) => {
                error!("Failed to encode server message: {}", e);
                BroadcastReport::default()
            }
        }
    }

    /// Send the greeting frame to a freshly registered connection
    pub async fn send_welcome(&self, id: &ConnectionId) -> Result<(), RelayError> {
        let welcome = ServerMessage::Welcome {
            connection_id: id.to_string(),
        };
        let payload = welcome
            .to_json()
            .map_err(|e| RelayError::write_failure(id.as_str(), e.to_string()))?;
        self.registry.send_to(id, Outbound::Text(payload)).await
    }

    async fn send_error(&self, id: &ConnectionId, message: &str) {
        let frame = ServerMessage::Error {
            message: message.to_string(),
        };
        if let Ok(payload) = frame.to_json() {
            if let Err(e) = self.registry.send_to(id, Outbound::Text(payload)).await {
                debug!("Could not deliver error frame: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ChannelSink, Connection};
    use crate::metrics::RelayMetrics;
    use crate::storage::MemoryChatStore;
    use tokio::sync::mpsc;

    async fn setup() -> (RelayEngine, ConnectionId, mpsc::Receiver<Outbound>) {
        let registry = Arc::new(ConnectionRegistry::new(8, Arc::new(RelayMetrics::new())));
        let engine = RelayEngine::new(Arc::clone(&registry), Arc::new(MemoryChatStore::new()));
        let (sink, rx) = ChannelSink::channel(8);
        let id = registry
            .register(Connection::new("127.0.0.1:7000".parse().unwrap(), sink))
            .await
            .unwrap();
        (engine, id, rx)
    }

    #[tokio::test]
    async fn test_chat_is_persisted_and_echoed() {
        let (engine, id, mut rx) = setup().await;

        engine
            .handle_inbound(&id, r#"{"type":"chat","room":"lobby","user":"kim","chat":"hi"}"#)
            .await
            .unwrap();

        let stored = engine.store().recent("lobby", 10).await.unwrap();
        assert_eq!(stored.len(), 1);

        match rx.try_recv().unwrap() {
            Outbound::Text(payload) => {
                assert!(payload.contains(r#""type":"chat""#));
                assert!(payload.contains(&stored[0].id));
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_closes_connection() {
        let (engine, id, mut rx) = setup().await;

        let err = engine.handle_inbound(&id, "{{nope").await.unwrap_err();
        assert!(matches!(err, RelayError::ProtocolViolation(_)));
        assert!(engine.registry().get(&id).await.is_none());

        match rx.try_recv().unwrap() {
            Outbound::Text(payload) => assert!(payload.contains(r#""type":"error""#)),
            other => panic!("unexpected frame: {:?}", other),
        }
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
    }

    #[tokio::test]
    async fn test_reply_is_accepted() {
        let (engine, id, mut rx) = setup().await;
        engine
            .handle_inbound(&id, r#"{"type":"reply","data":"pong"}"#)
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }
}
