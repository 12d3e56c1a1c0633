//! In-memory chat store

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{tail, ChatRecord, ChatStore, NewChat};
use crate::error::RelayError;

/// Keeps every chat in a vector; contents are lost on restart
#[derive(Debug, Default)]
pub struct MemoryChatStore {
    records: RwLock<Vec<ChatRecord>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn save(&self, chat: NewChat) -> Result<ChatRecord, RelayError> {
        let record = ChatRecord::from_new(chat);
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn recent(&self, room: &str, limit: usize) -> Result<Vec<ChatRecord>, RelayError> {
        let records = self.records.read().await;
        let in_room = records.iter().filter(|r| r.room == room).cloned().collect();
        Ok(tail(in_room, limit))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
