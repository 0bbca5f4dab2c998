//! Shared value types: connectivity status, queue entries, operation reports.

use chrono::{DateTime, Utc};
use pharmapos_core::Record;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connectivity state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// The hosted store answered the last probe.
    Online,
    /// Host network down, probe failing, or a consumer reported a network error.
    Offline,
}

/// Snapshot published by the connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityStatus {
    pub is_online: bool,
    /// Whether reads and writes should go to the hosted store right now.
    pub use_remote: bool,
    pub last_checked: DateTime<Utc>,
}

impl ConnectivityStatus {
    pub fn state(&self) -> ConnectivityState {
        if self.is_online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        }
    }
}

/// A write held for the hosted store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub id: Uuid,
    /// Hosted-store table name.
    pub table: String,
    /// Canonical-shaped record.
    pub payload: Record,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl SyncQueueEntry {
    pub fn new(table: impl Into<String>, payload: Record) -> Self {
        Self {
            id: Uuid::now_v7(),
            table: table.into(),
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }
}

/// What happened to a write handed to the sync queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QueueOutcome {
    /// Sent to the hosted store immediately; nothing was held.
    Sent,
    /// Held for a later `retry_all`.
    Queued { entry_id: Uuid },
    /// The immediate send used up the retry budget; the entry went straight
    /// to the dead-letter list and will not be replayed.
    DeadLettered { entry_id: Uuid },
}

/// Aggregate result of one `retry_all` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Entries still queued after the pass.
    pub remaining: usize,
}

/// What happened to a write issued through the data router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Upserted into the hosted store.
    Remote,
    /// Held in the sync queue for the hosted store.
    Queued { entry_id: Uuid, saved_locally: bool },
    /// Written to the local backend only; no hosted store is configured.
    Local,
    /// Not replayable: the only send attempt exhausted the retry budget.
    DeadLettered { entry_id: Uuid, saved_locally: bool },
    /// Refused by a store for a reason retrying will not fix.
    Rejected { reason: String },
}

/// A row that failed during `sync_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub key: Option<String>,
    pub error: String,
}

/// Per-table result of a bulk local→remote copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncTableReport {
    pub table: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// True when the pass was a no-op because the hosted store was unreachable.
    pub skipped: bool,
    pub errors: Vec<RowError>,
}

/// Row-count comparison between the two stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub table: String,
    pub consistent: bool,
    pub local_count: u64,
    pub remote_count: u64,
}

impl ConsistencyReport {
    pub fn new(table: impl Into<String>, local_count: u64, remote_count: u64) -> Self {
        Self {
            table: table.into(),
            consistent: local_count == remote_count,
            local_count,
            remote_count,
        }
    }

    /// Remote rows minus local rows.
    pub fn difference(&self) -> i64 {
        self.remote_count as i64 - self.local_count as i64
    }
}
