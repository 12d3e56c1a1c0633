//! Chat Storage Module
//!
//! The relay persists every chat message through a `ChatStore` before
//! fanning it out. Failures are logged by the caller; nothing is retried.

pub mod jsonl;
pub mod memory;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::RelayError;

pub use jsonl::JsonlChatStore;
pub use memory::MemoryChatStore;

/// A chat message that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChat {
    pub room: String,
    pub user: String,
    pub chat: Option<String>,
    pub gif: Option<String>,
}

/// A stored chat document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub room: String,
    pub user: String,
    #[serde(default)]
    pub chat: Option<String>,
    #[serde(default)]
    pub gif: Option<String>,
    #[serde(with = "humantime_serde")]
    pub created_at: SystemTime,
}

impl ChatRecord {
    /// Stamp a new chat with an id and the current time
    pub fn from_new(chat: NewChat) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            room: chat.room,
            user: chat.user,
            chat: chat.chat,
            gif: chat.gif,
            created_at: SystemTime::now(),
        }
    }
}

/// Persistence collaborator for chat messages
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Persist a chat message and return the stored record
    async fn save(&self, chat: NewChat) -> Result<ChatRecord, RelayError>;

    /// Most recent messages for a room, oldest first
    async fn recent(&self, room: &str, limit: usize) -> Result<Vec<ChatRecord>, RelayError>;

    /// Short backend name for logs and health output
    fn backend_name(&self) -> &'static str;
}

/// Build the store selected by configuration
pub async fn create_store(config: &StorageConfig) -> crate::Result<Arc<dyn ChatStore>> {
    let store: Arc<dyn ChatStore> = match config.backend {
        StorageBackend::Memory => Arc::new(MemoryChatStore::new()),
        StorageBackend::Jsonl => Arc::new(JsonlChatStore::open(&config.path).await?),
    };
    tracing::info!("Chat store ready: {}", store.backend_name());
    Ok(store)
}

/// Keep the last `limit` records, preserving order
pub(crate) fn tail(mut records: Vec<ChatRecord>, limit: usize) -> Vec<ChatRecord> {
    if records.len() > limit {
        records.drain(..records.len() - limit);
    }
    records
}
