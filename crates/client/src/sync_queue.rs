//! Holds writes that could not reach the hosted store and replays them later.
//!
//! Entries are applied with upsert semantics keyed by each table's unique key,
//! so replaying the same entry twice converges on the same row. Failed
//! replays bump the entry's attempt counter and leave it queued; with a capped
//! [`RetryPolicy`] an exhausted entry moves to the dead-letter list instead.

use std::sync::{Arc, Mutex};

use pharmapos_core::normalize::{normalize, to_store, unique_key_value};
use pharmapos_core::{DomainError, EntityKind, Record, Store};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::error::ClientError;
use crate::journal::QueueJournal;
use crate::lock::lock;
use crate::offline::ConnectivityProbe;
use crate::remote::RemoteStore;
use crate::types::{QueueOutcome, RetryReport, SyncQueueEntry};

pub struct SyncQueue {
    probe: Arc<ConnectivityProbe>,
    remote: Option<Arc<dyn RemoteStore>>,
    policy: RetryPolicy,
    journal: Option<QueueJournal>,
    entries: Mutex<Vec<SyncQueueEntry>>,
    dead: Mutex<Vec<SyncQueueEntry>>,
    replay: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("policy", &self.policy)
            .field("pending", &lock(&self.entries).len())
            .field("dead", &lock(&self.dead).len())
            .field("journal", &self.journal.is_some())
            .finish()
    }
}

impl SyncQueue {
    pub fn new(
        probe: Arc<ConnectivityProbe>,
        remote: Option<Arc<dyn RemoteStore>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            probe,
            remote,
            policy,
            journal: None,
            entries: Mutex::new(Vec::new()),
            dead: Mutex::new(Vec::new()),
            replay: tokio::sync::Mutex::new(()),
        }
    }

    /// Mirror every change into `journal`.
    pub fn with_journal(mut self, journal: QueueJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Load entries left in the journal by a previous run. Returns how many
    /// pending entries were restored.
    pub async fn restore(&self) -> usize {
        let Some(journal) = &self.journal else {
            return 0;
        };
        match journal.load().await {
            Ok(contents) => {
                let restored = contents.pending.len();
                prepend(&self.entries, contents.pending);
                prepend(&self.dead, contents.dead);
                if restored > 0 {
                    info!(restored, "restored held writes from journal");
                }
                restored
            }
            Err(err) => {
                error!(error = %err, "failed to load sync queue journal");
                0
            }
        }
    }

    /// Hand a write to the queue.
    ///
    /// `table` is an entity's hosted table or local resource name; `payload`
    /// may use either store's field names and must carry the unique key. When
    /// the hosted store is in use the write is sent right away and only held
    /// if that fails.
    pub async fn add_to_queue(
        &self,
        table: &str,
        payload: Record,
    ) -> Result<QueueOutcome, ClientError> {
        let descriptor = EntityKind::from_table(table)?.descriptor();
        if unique_key_value(descriptor, &payload).is_none() {
            return Err(DomainError::missing_key(descriptor.remote_table, descriptor.unique_key).into());
        }

        let mut entry = SyncQueueEntry::new(descriptor.remote_table, normalize(descriptor, &payload));

        if self.probe.get_status().use_remote {
            match self.send(&entry).await {
                Ok(()) => {
                    debug!(table = %entry.table, "write sent without queueing");
                    return Ok(QueueOutcome::Sent);
                }
                Err(err) => {
                    warn!(table = %entry.table, error = %err, "immediate send failed; holding write");
                    entry.attempts = 1;
                    entry.last_error = Some(err.to_string());
                    if err.is_network() {
                        self.probe.report_network_error(&err);
                    }
                }
            }
        }

        let entry_id = entry.id;
        if self.policy.exhausted(entry.attempts) {
            self.bury(entry).await;
            return Ok(QueueOutcome::DeadLettered { entry_id });
        }
        self.journal_save(&entry, false).await;
        lock(&self.entries).push(entry);
        debug!(%entry_id, size = self.get_queue_size(), "write held for replay");
        Ok(QueueOutcome::Queued { entry_id })
    }

    /// Try every held entry against the hosted store, in list order.
    ///
    /// Successful entries are removed; failed ones stay with their attempt
    /// counter bumped. Writes added while a replay runs are left for the next
    /// one. Concurrent calls run one after the other.
    pub async fn retry_all(&self) -> RetryReport {
        let _replay = self.replay.lock().await;
        let snapshot: Vec<SyncQueueEntry> = lock(&self.entries).clone();
        let mut report = RetryReport {
            attempted: snapshot.len(),
            ..RetryReport::default()
        };

        for entry in snapshot {
            match self.send(&entry).await {
                Ok(()) => {
                    report.succeeded += 1;
                    lock(&self.entries).retain(|e| e.id != entry.id);
                    self.journal_remove(entry.id).await;
                }
                Err(err) => {
                    report.failed += 1;
                    if self.record_failure(entry.id, &err).await {
                        report.dead_lettered += 1;
                    }
                }
            }
        }

        report.remaining = self.get_queue_size();
        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                remaining = report.remaining,
                "sync queue replay finished"
            );
        }
        report
    }

    pub fn get_queue_size(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn get_queue(&self) -> Vec<SyncQueueEntry> {
        lock(&self.entries).clone()
    }

    /// Discard every held entry. Returns how many were dropped.
    pub async fn clear_queue(&self) -> usize {
        let dropped = std::mem::take(&mut *lock(&self.entries)).len();
        if let Some(journal) = &self.journal {
            if let Err(err) = journal.clear(false).await {
                error!(error = %err, "failed to clear sync queue journal");
            }
        }
        if dropped > 0 {
            warn!(dropped, "sync queue cleared");
        }
        dropped
    }

    pub fn dead_letters(&self) -> Vec<SyncQueueEntry> {
        lock(&self.dead).clone()
    }

    pub async fn clear_dead_letters(&self) -> usize {
        let dropped = std::mem::take(&mut *lock(&self.dead)).len();
        if let Some(journal) = &self.journal {
            if let Err(err) = journal.clear(true).await {
                error!(error = %err, "failed to clear dead letters in journal");
            }
        }
        dropped
    }

    async fn send(&self, entry: &SyncQueueEntry) -> Result<(), ClientError> {
        let remote = self.remote.as_ref().ok_or(ClientError::RemoteUnavailable)?;
        let descriptor = EntityKind::from_table(&entry.table)?.descriptor();
        let row = to_store(descriptor, &entry.payload, Store::Remote);
        remote
            .upsert(descriptor.remote_table, &[row], descriptor.native_key(Store::Remote))
            .await
    }

    /// Bump the attempt counter of a held entry. Returns whether the entry was
    /// moved to the dead-letter list.
    async fn record_failure(&self, id: Uuid, err: &ClientError) -> bool {
        if err.is_network() {
            debug!(%id, error = %err, "replay failed; store unreachable");
            self.probe.report_network_error(err);
        } else {
            warn!(%id, error = %err, "replay rejected by hosted store");
        }

        let (updated, exhausted) = {
            let mut entries = lock(&self.entries);
            let Some(pos) = entries.iter().position(|e| e.id == id) else {
                return false;
            };
            let entry = &mut entries[pos];
            entry.attempts = entry.attempts.saturating_add(1);
            entry.last_error = Some(err.to_string());
            if self.policy.exhausted(entry.attempts) {
                (entries.remove(pos), true)
            } else {
                (entry.clone(), false)
            }
        };

        if exhausted {
            self.bury(updated).await;
        } else {
            self.journal_save(&updated, false).await;
        }
        exhausted
    }

    async fn bury(&self, entry: SyncQueueEntry) {
        warn!(
            id = %entry.id,
            table = %entry.table,
            attempts = entry.attempts,
            "write moved to dead letters"
        );
        self.journal_save(&entry, true).await;
        lock(&self.dead).push(entry);
    }

    async fn journal_save(&self, entry: &SyncQueueEntry, dead: bool) {
        if let Some(journal) = &self.journal {
            if let Err(err) = journal.save(entry, dead).await {
                error!(id = %entry.id, error = %err, "failed to journal queue entry");
            }
        }
    }

    async fn journal_remove(&self, id: Uuid) {
        if let Some(journal) = &self.journal {
            if let Err(err) = journal.remove(id).await {
                error!(%id, error = %err, "failed to drop queue entry from journal");
            }
        }
    }
}

fn prepend(list: &Mutex<Vec<SyncQueueEntry>>, older: Vec<SyncQueueEntry>) {
    let mut list = lock(list);
    let newer = std::mem::replace(&mut *list, older);
    list.extend(newer);
}
