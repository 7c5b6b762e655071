use crate::error::HistoryError;
use crate::util::lock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tether_core::{PeerId, Role, SessionCode};
use tokio::io::AsyncWriteExt;

/// One finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: SessionCode,
    pub role: Role,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_ms: i64,
    pub peer_id: Option<PeerId>,
}

impl SessionRecord {
    pub fn new(
        session_id: SessionCode,
        role: Role,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        peer_id: Option<PeerId>,
    ) -> Self {
        Self {
            session_id,
            role,
            start,
            end,
            duration_ms: (end - start).num_milliseconds().max(0),
            peer_id,
        }
    }
}

/// Append-only session history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: SessionRecord) -> Result<(), HistoryError>;

    async fn load(&self) -> Result<Vec<SessionRecord>, HistoryError>;
}

/// One JSON object per line.
pub struct JsonlHistoryStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn append(&self, record: SessionRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<SessionRecord>, HistoryError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(HistoryError::from))
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryHistoryStore {
    records: Mutex<Vec<SessionRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        lock(&self.records).clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, record: SessionRecord) -> Result<(), HistoryError> {
        lock(&self.records).push(record);
        Ok(())
    }

    async fn load(&self) -> Result<Vec<SessionRecord>, HistoryError> {
        Ok(self.records())
    }
}
