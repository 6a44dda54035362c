use async_trait::async_trait;
use chrono::{DateTime, Utc};
use practice_core::model::SnapshotKey;
use sqlx::Row;

use super::SqliteRepository;
use crate::repository::{SnapshotRecord, SnapshotRepository, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl SnapshotRepository for SqliteRepository {
    async fn load_snapshot(
        &self,
        key: &SnapshotKey,
    ) -> Result<Option<SnapshotRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT key, payload, saved_at
            FROM session_snapshots
            WHERE key = ?1
            ",
        )
        .bind(key.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stored_key: String = row.try_get("key").map_err(ser)?;
        let payload: String = row.try_get("payload").map_err(ser)?;
        let saved_at: DateTime<Utc> = row.try_get("saved_at").map_err(ser)?;

        Ok(Some(SnapshotRecord::new(
            SnapshotKey::from_persisted(stored_key),
            payload,
            saved_at,
        )))
    }

    async fn save_snapshot(&self, record: &SnapshotRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO session_snapshots (key, payload, saved_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                saved_at = excluded.saved_at
            ",
        )
        .bind(record.key.as_str())
        .bind(&record.payload)
        .bind(record.saved_at)
        .execute(self.pool())
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn delete_snapshot(&self, key: &SnapshotKey) -> Result<bool, StorageError> {
        let res = sqlx::query("DELETE FROM session_snapshots WHERE key = ?1")
            .bind(key.as_str())
            .execute(self.pool())
            .await
            .map_err(conn)?;
        Ok(res.rows_affected() > 0)
    }
}
