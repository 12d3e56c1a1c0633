//! Append-only JSON-lines chat store
//!
//! One document per line. Unreadable lines are skipped on read so a torn
//! final write does not hide earlier history.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{tail, ChatRecord, ChatStore, NewChat};
use crate::error::RelayError;

/// File-backed document store
#[derive(Debug)]
pub struct JsonlChatStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlChatStore {
    /// Open (creating if needed) the store at `path`
    pub async fn open(path: &Path) -> crate::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create store directory: {}", parent.display()))?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open chat store: {}", path.display()))?;

        debug!("Opened JSON-lines chat store at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChatStore for JsonlChatStore {
    async fn save(&self, chat: NewChat) -> Result<ChatRecord, RelayError> {
        let record = ChatRecord::from_new(chat);
        let mut line = serde_json::to_string(&record)
            .map_err(|e| RelayError::PersistenceFailure(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(record)
    }

    async fn recent(&self, room: &str, limit: usize) -> Result<Vec<ChatRecord>, RelayError> {
        let content = fs::read_to_string(&self.path).await?;

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChatRecord>(line) {
                Ok(record) if record.room == room => records.push(record),
                Ok(_) => {}
                Err(e) => warn!(
                    "Skipping unreadable line {} in {}: {}",
                    line_no + 1,
                    self.path.display(),
                    e
                ),
            }
        }

        Ok(tail(records, limit))
    }

    fn backend_name(&self) -> &'static str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chat(room: &str, text: &str) -> NewChat {
        NewChat {
            room: room.to_string(),
            user: "lee".to_string(),
            chat: Some(text.to_string()),
            gif: None,
        }
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("chats.jsonl");

        {
            let store = JsonlChatStore::open(&path).await.unwrap();
            store.save(chat("lobby", "first")).await.unwrap();
            store.save(chat("lobby", "second")).await.unwrap();
        }

        let store = JsonlChatStore::open(&path).await.unwrap();
        let recent = store.recent("lobby", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].chat.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_corrupt_line_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chats.jsonl");
        let store = JsonlChatStore::open(&path).await.unwrap();
        store.save(chat("lobby", "kept")).await.unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"{\"id\": broken\n").await.unwrap();

        let recent = store.recent("lobby", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_persistence_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chats.jsonl");
        let store = JsonlChatStore::open(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let err = store.save(chat("lobby", "lost")).await.unwrap_err();
        assert!(matches!(err, RelayError::PersistenceFailure(_)));
    }
}
