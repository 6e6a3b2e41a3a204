//! Session transcripts persisted across invocations.
//!
//! Loading is deliberately soft: a missing or unreadable session yields an
//! empty history so a trigger never fails because of stale memory.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::message::Message;

/// Minimal keyed byte storage. Keys may contain `/` separators.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> anyhow::Result<()> {
        (**self).put(key, body, content_type).await
    }
}

/// Object store backed by a directory tree.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for FileStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, body).await?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct MemoryRecord {
    conversation_history: Vec<Message>,
}

/// Conversation memory keyed by agent name and session id.
pub struct MemoryStore<S: ObjectStore> {
    store: S,
}

impl<S: ObjectStore> MemoryStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn key(agent: &str, session: &str) -> String {
        format!("{}-memory/{}.json", agent, session)
    }

    /// Load a session's history. Never errors; misses come back empty.
    pub async fn load(&self, agent: &str, session: &str) -> Vec<Message> {
        let key = Self::key(agent, session);
        let bytes = match self.store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::info!(key = %key, "no prior memory for session");
                return Vec::new();
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "memory load failed");
                return Vec::new();
            }
        };
        match serde_json::from_slice::<MemoryRecord>(&bytes) {
            Ok(record) => {
                tracing::info!(
                    key = %key,
                    messages = record.conversation_history.len(),
                    "loaded session memory"
                );
                record.conversation_history
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "memory parse failed, starting fresh");
                Vec::new()
            }
        }
    }

    /// Overwrite the session's history with the full transcript.
    pub async fn save(
        &self,
        agent: &str,
        session: &str,
        history: &[Message],
    ) -> anyhow::Result<()> {
        let record = MemoryRecord {
            conversation_history: history.to_vec(),
        };
        let body = serde_json::to_vec(&record)?;
        self.store
            .put(&Self::key(agent, session), body, "application/json")
            .await
    }
}
