//! Manually triggered bulk copy and consistency checks between the stores.
//!
//! `DataSyncManager` works on a registered set of tables:
//! - `sync_table` copies every local row into the hosted store (upsert)
//! - `verify_consistency` compares row counts without reconciling
//!
//! There is no transaction around a pass. A partial failure leaves the stores
//! out of step until the pass is run again.

use std::sync::{Arc, Mutex};

use pharmapos_core::filter::value_text;
use pharmapos_core::normalize::{normalize, to_store, unique_key_value};
use pharmapos_core::{DomainError, EntityKind, Store};
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::local::LocalBackend;
use crate::lock::lock;
use crate::offline::ConnectivityProbe;
use crate::remote::RemoteStore;
use crate::types::{ConsistencyReport, RowError, SyncTableReport};

pub struct DataSyncManager {
    probe: Arc<ConnectivityProbe>,
    remote: Option<Arc<dyn RemoteStore>>,
    local: Arc<dyn LocalBackend>,
    tables: Mutex<Vec<EntityKind>>,
}

impl DataSyncManager {
    pub fn new(
        probe: Arc<ConnectivityProbe>,
        remote: Option<Arc<dyn RemoteStore>>,
        local: Arc<dyn LocalBackend>,
    ) -> Self {
        Self {
            probe,
            remote,
            local,
            tables: Mutex::new(Vec::new()),
        }
    }

    /// Manager with every catalog entity registered.
    pub fn with_all_tables(self) -> Self {
        *lock(&self.tables) = EntityKind::ALL.to_vec();
        self
    }

    /// Add a table by either store's name. Registering twice is a no-op.
    pub fn register(&self, name: &str) -> Result<EntityKind, ClientError> {
        let kind = EntityKind::from_table(name)?;
        let mut tables = lock(&self.tables);
        if !tables.contains(&kind) {
            tables.push(kind);
        }
        Ok(kind)
    }

    /// Hosted table names, in registration order.
    pub fn registered_tables(&self) -> Vec<&'static str> {
        lock(&self.tables)
            .iter()
            .map(|k| k.descriptor().remote_table)
            .collect()
    }

    fn registered(&self, name: &str) -> Result<EntityKind, ClientError> {
        let kind = EntityKind::from_table(name)?;
        if lock(&self.tables).contains(&kind) {
            Ok(kind)
        } else {
            Err(DomainError::validation(format!("table `{name}` is not registered for sync")).into())
        }
    }

    /// Copy every local row of `name` into the hosted store.
    ///
    /// Does nothing (`skipped`) while the hosted store is not in use. Rows are
    /// upserted one at a time so each gets its own verdict; the first
    /// network-shaped failure ends the pass and the rows not yet tried count
    /// as failed.
    pub async fn sync_table(&self, name: &str) -> Result<SyncTableReport, ClientError> {
        let kind = self.registered(name)?;
        let descriptor = kind.descriptor();
        let mut report = SyncTableReport {
            table: descriptor.remote_table.to_string(),
            ..SyncTableReport::default()
        };

        let remote = match &self.remote {
            Some(remote) if self.probe.get_status().use_remote => remote,
            _ => {
                info!(table = %kind, "hosted store not in use; sync skipped");
                report.skipped = true;
                return Ok(report);
            }
        };

        let rows = self.local.read(descriptor.local_resource, &[]).await?;
        report.total = rows.len();
        info!(table = %kind, rows = report.total, "syncing local rows to hosted store");

        let conflict_key = descriptor.native_key(Store::Remote);
        for (index, row) in rows.iter().enumerate() {
            let canonical = normalize(descriptor, row);
            let key = unique_key_value(descriptor, &canonical);
            let Some(key) = key else {
                report.failed += 1;
                report.errors.push(RowError {
                    key: None,
                    error: format!("missing unique key `{}`", descriptor.unique_key),
                });
                continue;
            };

            let remote_row = to_store(descriptor, &canonical, Store::Remote);
            match remote.upsert(descriptor.remote_table, &[remote_row], conflict_key).await {
                Ok(()) => report.succeeded += 1,
                Err(err) => {
                    report.failed += 1;
                    report.errors.push(RowError {
                        key: Some(value_text(&key)),
                        error: err.to_string(),
                    });
                    if err.is_network() {
                        self.probe.report_network_error(&err);
                        let untried = rows.len() - index - 1;
                        report.failed += untried;
                        warn!(table = %kind, untried, error = %err, "hosted store lost during sync");
                        break;
                    }
                    debug!(table = %kind, key = %value_text(&key), error = %err, "row refused");
                }
            }
        }

        info!(
            table = %kind,
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "table sync finished"
        );
        Ok(report)
    }

    /// Compare row counts between the two stores.
    pub async fn verify_consistency(&self, name: &str) -> Result<ConsistencyReport, ClientError> {
        let kind = self.registered(name)?;
        let descriptor = kind.descriptor();
        let remote = self.remote.as_ref().ok_or(ClientError::RemoteUnavailable)?;
        if !self.probe.get_status().use_remote {
            return Err(ClientError::Offline);
        }

        let local_count = self.local.read(descriptor.local_resource, &[]).await?.len() as u64;
        let remote_count = remote.count(descriptor.remote_table).await?;
        let report = ConsistencyReport::new(descriptor.remote_table, local_count, remote_count);
        if report.consistent {
            info!(table = %kind, rows = local_count, "stores agree");
        } else {
            warn!(table = %kind, local_count, remote_count, "row counts differ");
        }
        Ok(report)
    }

    pub async fn sync_all(&self) -> Vec<(&'static str, Result<SyncTableReport, ClientError>)> {
        let mut results = Vec::new();
        for table in self.registered_tables() {
            results.push((table, self.sync_table(table).await));
        }
        results
    }

    pub async fn verify_all(&self) -> Vec<(&'static str, Result<ConsistencyReport, ClientError>)> {
        let mut results = Vec::new();
        for table in self.registered_tables() {
            results.push((table, self.verify_consistency(table).await));
        }
        results
    }
}

impl std::fmt::Debug for DataSyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSyncManager")
            .field("tables", &self.registered_tables())
            .field("has_remote", &self.remote.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::local::InMemoryLocalBackend;
    use crate::network::HostNetwork;
    use crate::remote::InMemoryRemoteStore;
    use pharmapos_core::Record;
    use serde_json::{Value, json};

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn manager(
        online: bool,
        remote: InMemoryRemoteStore,
        local: InMemoryLocalBackend,
    ) -> (Arc<InMemoryRemoteStore>, DataSyncManager) {
        let remote = Arc::new(remote);
        let probe = Arc::new(ConnectivityProbe::new(
            ProbeConfig::default(),
            Arc::new(HostNetwork::new(online)),
            Some(remote.clone()),
        ));
        let manager = DataSyncManager::new(probe, Some(remote.clone()), Arc::new(local));
        (remote, manager)
    }

    fn stock_rows() -> Vec<Record> {
        vec![
            record(json!({ "StockID": 1, "ProductID": 10, "QtyAdded": 50 })),
            record(json!({ "StockID": 2, "ProductID": 11, "QtyAdded": 20 })),
            record(json!({ "ProductID": 12, "QtyAdded": 5 })),
        ]
    }

    #[test]
    fn registration_is_idempotent_and_accepts_both_names() {
        let (_, m) = manager(true, InMemoryRemoteStore::new(), InMemoryLocalBackend::new());
        m.register("stock").unwrap();
        m.register("stock_entries").unwrap();
        m.register("products").unwrap();
        assert_eq!(m.registered_tables(), vec!["stock_entries", "products"]);
        assert!(matches!(m.register("orders"), Err(ClientError::Domain(DomainError::UnknownTable(_)))));
    }

    #[tokio::test]
    async fn sync_reports_per_row_results() {
        let local = InMemoryLocalBackend::new().with_rows("stock", stock_rows());
        let (remote, m) = manager(true, InMemoryRemoteStore::new(), local);
        m.register("stock").unwrap();
        remote.reject_where("entry_id", json!(2));

        let report = m.sync_table("stock").await.unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.errors[0].key.as_deref(), Some("2"));
        assert_eq!(report.errors[1].key, None);
        assert_eq!(
            remote.rows("stock_entries"),
            vec![record(json!({ "entry_id": 1, "product_id": 10, "quantity": 50 }))]
        );
    }

    #[tokio::test]
    async fn sync_is_a_no_op_offline() {
        let local = InMemoryLocalBackend::new().with_rows("stock", stock_rows());
        let (remote, m) = manager(false, InMemoryRemoteStore::new(), local);
        m.register("stock").unwrap();

        let report = m.sync_table("stock").await.unwrap();
        assert!(report.skipped);
        assert_eq!(report.total, 0);
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn unregistered_tables_are_refused() {
        let (_, m) = manager(true, InMemoryRemoteStore::new(), InMemoryLocalBackend::new());
        assert!(matches!(
            m.sync_table("sales").await,
            Err(ClientError::Domain(DomainError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn verify_compares_counts_without_reconciling() {
        let local = InMemoryLocalBackend::new().with_rows(
            "products",
            vec![record(json!({ "ProductID": 1 })), record(json!({ "ProductID": 2 }))],
        );
        let remote = InMemoryRemoteStore::new().with_rows("products", vec![record(json!({ "product_id": 1 }))]);
        let (remote, m) = manager(true, remote, local);
        m.register("products").unwrap();

        let report = m.verify_consistency("products").await.unwrap();
        assert!(!report.consistent);
        assert_eq!(report.difference(), -1);
        assert_eq!(remote.rows("products").len(), 1);

        m.sync_table("products").await.unwrap();
        assert!(m.verify_consistency("products").await.unwrap().consistent);
    }

    #[tokio::test]
    async fn all_passes_cover_every_registered_table() {
        let (_, m) = manager(true, InMemoryRemoteStore::new(), InMemoryLocalBackend::new());
        let m = m.with_all_tables();
        let synced = m.sync_all().await;
        assert_eq!(synced.len(), EntityKind::ALL.len());
        assert!(synced.iter().all(|(_, r)| r.as_ref().is_ok_and(|r| r.total == 0)));
        let verified = m.verify_all().await;
        assert!(verified.iter().all(|(_, r)| r.as_ref().is_ok_and(|r| r.consistent)));
    }
}
