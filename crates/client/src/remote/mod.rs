//! Hosted primary store.

mod memory;
mod rest;

use async_trait::async_trait;
use pharmapos_core::Record;
use serde_json::Value;

use crate::error::ClientError;

pub use memory::InMemoryRemoteStore;
pub use rest::RestRemoteStore;

/// Equality condition on a native column name.
pub type Equality = (String, Value);

/// Query surface of the hosted table store.
///
/// Table and column names are the store's native ones; callers normalize.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Cheapest possible query proving the store answers.
    async fn ping(&self) -> Result<(), ClientError>;

    async fn select(&self, table: &str, filters: &[Equality]) -> Result<Vec<Record>, ClientError>;

    async fn insert(&self, table: &str, rows: &[Record]) -> Result<(), ClientError>;

    /// Insert or overwrite rows matching on `on_conflict`.
    async fn upsert(&self, table: &str, rows: &[Record], on_conflict: &str)
    -> Result<(), ClientError>;

    async fn count(&self, table: &str) -> Result<u64, ClientError>;
}
