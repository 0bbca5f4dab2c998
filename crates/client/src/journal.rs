//! Optional SQLite journal for the sync queue.
//!
//! Held writes are mirrored into a single `sync_queue` table so they survive a
//! restart. The in-memory queue stays authoritative while the process runs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use crate::types::SyncQueueEntry;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt journal row {id}: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("no data directory available for the queue journal")]
    NoDataDir,
}

/// Journal rows split by state.
#[derive(Debug, Default)]
pub struct JournalContents {
    pub pending: Vec<SyncQueueEntry>,
    pub dead: Vec<SyncQueueEntry>,
}

#[derive(Debug, Clone)]
pub struct QueueJournal {
    pool: SqlitePool,
}

impl QueueJournal {
    /// Open (creating if needed) a journal file.
    pub async fn open(path: &Path) -> Result<Self, JournalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        tracing::debug!(path = %path.display(), "opened sync queue journal");
        Self::migrate(pool).await
    }

    /// A journal that lives only as long as this value.
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool is
    /// pinned to one connection that never expires.
    pub async fn in_memory() -> Result<Self, JournalError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, JournalError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_queue (
                id           TEXT PRIMARY KEY,
                table_name   TEXT NOT NULL,
                payload      TEXT NOT NULL,
                enqueued_at  TEXT NOT NULL,
                attempts     INTEGER NOT NULL DEFAULT 0,
                last_error   TEXT NULL,
                dead         INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Insert or update one entry.
    pub async fn save(&self, entry: &SyncQueueEntry, dead: bool) -> Result<(), JournalError> {
        sqlx::query(
            r#"
            INSERT INTO sync_queue (id, table_name, payload, enqueued_at, attempts, last_error, dead)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                attempts = excluded.attempts,
                last_error = excluded.last_error,
                dead = excluded.dead
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.table)
        .bind(Value::Object(entry.payload.clone()).to_string())
        .bind(entry.enqueued_at.to_rfc3339())
        .bind(i64::from(entry.attempts))
        .bind(entry.last_error.as_deref())
        .bind(dead)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), JournalError> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete every pending (or every dead) entry. Returns the number removed.
    pub async fn clear(&self, dead: bool) -> Result<u64, JournalError> {
        let done = sqlx::query("DELETE FROM sync_queue WHERE dead = ?1")
            .bind(dead)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    /// All entries in enqueue order.
    pub async fn load(&self) -> Result<JournalContents, JournalError> {
        let rows = sqlx::query(
            r#"
            SELECT id, table_name, payload, enqueued_at, attempts, last_error, dead
            FROM sync_queue
            ORDER BY enqueued_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut contents = JournalContents::default();
        for row in rows {
            let dead: bool = row.try_get("dead")?;
            let entry = row_to_entry(&row)?;
            if dead {
                contents.dead.push(entry);
            } else {
                contents.pending.push(entry);
            }
        }
        Ok(contents)
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<SyncQueueEntry, JournalError> {
    let id_str: String = row.try_get("id")?;
    let corrupt = |reason: String| JournalError::Corrupt {
        id: id_str.clone(),
        reason,
    };

    let id = Uuid::parse_str(&id_str).map_err(|e| corrupt(e.to_string()))?;
    let payload_str: String = row.try_get("payload")?;
    let payload = match serde_json::from_str::<Value>(&payload_str) {
        Ok(Value::Object(map)) => map,
        Ok(other) => return Err(corrupt(format!("payload is not an object: {other}"))),
        Err(e) => return Err(corrupt(e.to_string())),
    };
    let enqueued_str: String = row.try_get("enqueued_at")?;
    let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(e.to_string()))?;
    let attempts: i64 = row.try_get("attempts")?;

    Ok(SyncQueueEntry {
        id,
        table: row.try_get("table_name")?,
        payload,
        enqueued_at,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        last_error: row.try_get("last_error")?,
    })
}

/// `{data_dir}/pharmapos/sync_queue.db`, falling back to `~/.local/share`.
pub fn default_journal_path() -> Result<PathBuf, JournalError> {
    let mut dir = dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .ok_or(JournalError::NoDataDir)?;
    dir.push("pharmapos");
    dir.push("sync_queue.db");
    Ok(dir)
}
