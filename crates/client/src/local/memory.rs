use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use pharmapos_core::Record;
use pharmapos_core::filter::value_text;
use serde_json::Value;

use super::LocalBackend;
use crate::error::ClientError;
use crate::lock::lock;
use crate::remote::Equality;

/// In-memory local backend.
///
/// Intended for tests/dev. Applies equality params the way the PHP endpoints
/// do (string comparison) and counts calls.
#[derive(Debug, Default)]
pub struct InMemoryLocalBackend {
    resources: Mutex<HashMap<String, Vec<Record>>>,
    failing: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryLocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, resource: &str, rows: Vec<Record>) -> Self {
        lock(&self.resources).insert(resource.to_string(), rows);
        self
    }

    /// Make every call answer `success: false`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn rows(&self, resource: &str) -> Vec<Record> {
        lock(&self.resources).get(resource).cloned().unwrap_or_default()
    }

    fn check_failing(&self) -> Result<(), ClientError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClientError::Backend("database connection failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalBackend for InMemoryLocalBackend {
    async fn read(&self, resource: &str, params: &[Equality]) -> Result<Vec<Record>, ClientError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        let resources = lock(&self.resources);
        Ok(resources
            .get(resource)
            .map(|rows| {
                rows.iter()
                    .filter(|r| {
                        params.iter().all(|(k, v)| {
                            r.get(k).is_some_and(|have| value_text(have) == value_text(v))
                        })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, resource: &str, record: &Record) -> Result<Option<Value>, ClientError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        let mut resources = lock(&self.resources);
        let rows = resources.entry(resource.to_string()).or_default();
        rows.push(record.clone());
        Ok(Some(Value::from(rows.len() as u64)))
    }
}
