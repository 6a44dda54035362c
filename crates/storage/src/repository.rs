use async_trait::async_trait;
use chrono::{DateTime, Utc};
use practice_core::model::SnapshotKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted shape of a session snapshot.
///
/// Storage treats `payload` as an opaque string; encoding and validation of the
/// session lives in the services layer so a corrupt payload is still loadable
/// and can be reported (and discarded) by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub key: SnapshotKey,
    pub payload: String,
    pub saved_at: DateTime<Utc>,
}

impl SnapshotRecord {
    #[must_use]
    pub fn new(key: SnapshotKey, payload: impl Into<String>, saved_at: DateTime<Utc>) -> Self {
        Self {
            key,
            payload: payload.into(),
            saved_at,
        }
    }
}

/// Durable key/value store for resumable sessions.
///
/// Implementations must make `save_snapshot` durable before returning.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Fetch the snapshot stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn load_snapshot(&self, key: &SnapshotKey)
    -> Result<Option<SnapshotRecord>, StorageError>;

    /// Insert or replace the snapshot under `record.key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn save_snapshot(&self, record: &SnapshotRecord) -> Result<(), StorageError>;

    /// Remove the snapshot under `key`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn delete_snapshot(&self, key: &SnapshotKey) -> Result<bool, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    snapshots: Arc<Mutex<HashMap<SnapshotKey, SnapshotRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Overwrite a stored payload verbatim, bypassing any encoding.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn put_raw(
        &self,
        key: SnapshotKey,
        payload: impl Into<String>,
        saved_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.clone(), SnapshotRecord::new(key, payload, saved_at));
        Ok(())
    }
}

#[async_trait]
impl SnapshotRepository for InMemoryRepository {
    async fn load_snapshot(
        &self,
        key: &SnapshotKey,
    ) -> Result<Option<SnapshotRecord>, StorageError> {
        let guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn save_snapshot(&self, record: &SnapshotRecord) -> Result<(), StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn delete_snapshot(&self, key: &SnapshotKey) -> Result<bool, StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.remove(key).is_some())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub snapshots: Arc<dyn SnapshotRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let snapshots: Arc<dyn SnapshotRepository> = Arc::new(InMemoryRepository::new());
        Self { snapshots }
    }
}
