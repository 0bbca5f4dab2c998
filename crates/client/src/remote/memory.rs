use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pharmapos_core::Record;
use serde_json::Value;

use super::{Equality, RemoteStore};
use crate::error::ClientError;
use crate::lock::lock;

/// In-memory hosted store.
///
/// Intended for tests/dev. Supports latency and failure injection and counts
/// every call so routing decisions can be asserted.
#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    ping_latency: Mutex<Duration>,
    call_latency: Mutex<Duration>,
    unreachable: AtomicBool,
    /// Rows whose `column == value` are refused on write.
    reject: Mutex<Option<(String, Value)>>,
    pings: AtomicUsize,
    pings_answered: AtomicUsize,
    calls: AtomicUsize,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with rows.
    pub fn with_rows(self, table: &str, rows: Vec<Record>) -> Self {
        lock(&self.tables).insert(table.to_string(), rows);
        self
    }

    pub fn set_ping_latency(&self, latency: Duration) {
        *lock(&self.ping_latency) = latency;
    }

    /// Delay every data call (select/insert/upsert/count) by `latency`.
    pub fn set_call_latency(&self, latency: Duration) {
        *lock(&self.call_latency) = latency;
    }

    /// Make every call fail with a network error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Refuse writes of rows where `column == value` (HTTP 409).
    pub fn reject_where(&self, column: &str, value: Value) {
        *lock(&self.reject) = Some((column.to_string(), value));
    }

    pub fn clear_rejection(&self) {
        *lock(&self.reject) = None;
    }

    /// Number of reachability queries received.
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Number of reachability queries that ran to completion, whether or not
    /// anyone was still waiting for the answer.
    pub fn pings_answered(&self) -> usize {
        self.pings_answered.load(Ordering::SeqCst)
    }

    /// Number of data calls (select/insert/upsert/count) received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    async fn enter(&self) -> Result<(), ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *lock(&self.call_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ClientError::Network("connection refused".to_string()));
        }
        Ok(())
    }

    fn check_rejected(&self, rows: &[Record]) -> Result<(), ClientError> {
        if let Some((column, value)) = lock(&self.reject).as_ref() {
            if rows.iter().any(|r| r.get(column) == Some(value)) {
                return Err(ClientError::Http {
                    status: 409,
                    body: format!("row rejected on `{column}`"),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn ping(&self) -> Result<(), ClientError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let latency = *lock(&self.ping_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.pings_answered.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ClientError::Network("connection refused".to_string()));
        }
        Ok(())
    }

    async fn select(&self, table: &str, filters: &[Equality]) -> Result<Vec<Record>, ClientError> {
        self.enter().await?;
        let tables = lock(&self.tables);
        let rows = tables.get(table).map(Vec::as_slice).unwrap_or_default();
        Ok(rows
            .iter()
            .filter(|r| filters.iter().all(|(c, v)| r.get(c) == Some(v)))
            .cloned()
            .collect())
    }

    async fn insert(&self, table: &str, rows: &[Record]) -> Result<(), ClientError> {
        self.enter().await?;
        self.check_rejected(rows)?;
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(())
    }

    async fn upsert(
        &self,
        table: &str,
        rows: &[Record],
        on_conflict: &str,
    ) -> Result<(), ClientError> {
        self.enter().await?;
        self.check_rejected(rows)?;
        let mut tables = lock(&self.tables);
        let existing = tables.entry(table.to_string()).or_default();
        for row in rows {
            let key = row.get(on_conflict).filter(|v| !v.is_null());
            let slot = key.and_then(|k| existing.iter_mut().find(|e| e.get(on_conflict) == Some(k)));
            match slot {
                Some(current) => {
                    for (field, value) in row {
                        current.insert(field.clone(), value.clone());
                    }
                }
                None => existing.push(row.clone()),
            }
        }
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<u64, ClientError> {
        self.enter().await?;
        Ok(lock(&self.tables).get(table).map_or(0, |rows| rows.len() as u64))
    }
}
