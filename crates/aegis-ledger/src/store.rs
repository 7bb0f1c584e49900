//! Durable storage for the chain and its checkpoints.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::checkpoint::AuditCheckpoint;
use crate::error::LedgerError;
use crate::event::AuditEvent;

const EVENTS_FILE: &str = "events.json";
const CHECKPOINTS_FILE: &str = "checkpoints.json";

/// Where the ledger keeps its events and checkpoints.
///
/// Saves replace the whole collection; a store must never expose a
/// partially written collection to a later load.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load_events(&self) -> Result<Vec<AuditEvent>, LedgerError>;

    async fn save_events(&self, events: &[AuditEvent]) -> Result<(), LedgerError>;

    async fn load_checkpoints(&self) -> Result<Vec<AuditCheckpoint>, LedgerError>;

    async fn save_checkpoints(&self, checkpoints: &[AuditCheckpoint]) -> Result<(), LedgerError>;
}

/// JSON arrays in a data directory, replaced via temp file + rename.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    dir: PathBuf,
}

impl FileLedgerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn events_path(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }

    pub fn checkpoints_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINTS_FILE)
    }

    async fn read_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LedgerError> {
        match tokio::fs::read(path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(LedgerError::io(path, e)),
        }
    }

    async fn write_atomic<T: Serialize>(&self, path: &Path, items: &[T]) -> Result<(), LedgerError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| LedgerError::io(&self.dir, e))?;

        let bytes = serde_json::to_vec_pretty(items)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| LedgerError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| LedgerError::io(path, e))?;

        debug!(path = %path.display(), records = items.len(), "ledger file replaced");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    async fn load_events(&self) -> Result<Vec<AuditEvent>, LedgerError> {
        Self::read_array(&self.events_path()).await
    }

    async fn save_events(&self, events: &[AuditEvent]) -> Result<(), LedgerError> {
        self.write_atomic(&self.events_path(), events).await
    }

    async fn load_checkpoints(&self) -> Result<Vec<AuditCheckpoint>, LedgerError> {
        Self::read_array(&self.checkpoints_path()).await
    }

    async fn save_checkpoints(&self, checkpoints: &[AuditCheckpoint]) -> Result<(), LedgerError> {
        self.write_atomic(&self.checkpoints_path(), checkpoints).await
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    events: RwLock<Vec<AuditEvent>>,
    checkpoints: RwLock<Vec<AuditCheckpoint>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored events, bypassing the ledger.
    pub fn replace_events(&self, events: Vec<AuditEvent>) {
        *self.events.write() = events;
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load_events(&self) -> Result<Vec<AuditEvent>, LedgerError> {
        Ok(self.events.read().clone())
    }

    async fn save_events(&self, events: &[AuditEvent]) -> Result<(), LedgerError> {
        *self.events.write() = events.to_vec();
        Ok(())
    }

    async fn load_checkpoints(&self) -> Result<Vec<AuditCheckpoint>, LedgerError> {
        Ok(self.checkpoints.read().clone())
    }

    async fn save_checkpoints(&self, checkpoints: &[AuditCheckpoint]) -> Result<(), LedgerError> {
        *self.checkpoints.write() = checkpoints.to_vec();
        Ok(())
    }
}
