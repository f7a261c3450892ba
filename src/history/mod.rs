//! Log of answered questions.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::Result;

/// One answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub query: String,
    pub response: String,
    pub thread_id: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationRecord {
    pub fn new(
        query: impl Into<String>,
        response: impl Into<String>,
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Sink for answered questions.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn append(&self, record: &ConversationRecord) -> Result<()>;

    /// Records in insertion order.
    async fn records(&self) -> Result<Vec<ConversationRecord>>;
}

#[derive(Debug, Default)]
pub struct MemoryConversationLog {
    records: Mutex<Vec<ConversationRecord>>,
}

impl MemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationLog for MemoryConversationLog {
    async fn append(&self, record: &ConversationRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn records(&self) -> Result<Vec<ConversationRecord>> {
        Ok(self.records.lock().await.clone())
    }
}

/// Appends one JSON object per line.
#[derive(Debug)]
pub struct JsonlConversationLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlConversationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConversationLog for JsonlConversationLog {
    async fn append(&self, record: &ConversationRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn records(&self) -> Result<Vec<ConversationRecord>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut records = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), line = index + 1, error = %err, "skipping corrupt history line");
                }
            }
        }
        Ok(records)
    }
}
