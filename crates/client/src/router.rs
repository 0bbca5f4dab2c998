//! Per-entity data access that picks exactly one store per call.
//!
//! The decision is made from the probe status at call time and is not held
//! for the duration of the call: a request that started online and finishes
//! after a flip to offline returns whatever the store it actually called
//! answered.

use std::sync::Arc;

use pharmapos_core::filter::{self, Filter};
use pharmapos_core::normalize::{normalize, normalize_all, to_store, unique_key_value};
use pharmapos_core::{EntityDescriptor, EntityKind, Record, Store};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::local::LocalBackend;
use crate::offline::ConnectivityProbe;
use crate::remote::{Equality, RemoteStore};
use crate::sync_queue::SyncQueue;
use crate::types::{QueueOutcome, WriteOutcome};

pub struct DataRouter {
    probe: Arc<ConnectivityProbe>,
    remote: Option<Arc<dyn RemoteStore>>,
    local: Arc<dyn LocalBackend>,
    queue: Arc<SyncQueue>,
}

impl DataRouter {
    pub fn new(
        probe: Arc<ConnectivityProbe>,
        remote: Option<Arc<dyn RemoteStore>>,
        local: Arc<dyn LocalBackend>,
        queue: Arc<SyncQueue>,
    ) -> Self {
        Self {
            probe,
            remote,
            local,
            queue,
        }
    }

    /// Read rows of `kind` matching every filter, in canonical shape.
    ///
    /// Never fails: any store error is logged and yields an empty list.
    pub async fn fetch(&self, kind: EntityKind, filters: &[Filter]) -> Vec<Record> {
        let descriptor = kind.descriptor();
        if let Err(err) = filter::validate(descriptor, filters) {
            error!(entity = %kind, error = %err, "rejected fetch with invalid filter");
            return Vec::new();
        }

        let remote = match &self.remote {
            Some(remote) if self.probe.get_status().use_remote => remote,
            _ => return self.fetch_local(descriptor, filters).await,
        };

        match remote
            .select(descriptor.remote_table, &native_params(descriptor, filters, Store::Remote))
            .await
        {
            Ok(rows) => normalize_all(descriptor, &rows),
            Err(err) => {
                if err.is_network() {
                    debug!(entity = %kind, error = %err, "hosted store unreachable");
                    self.probe.report_network_error(&err);
                } else {
                    warn!(entity = %kind, error = %err, "hosted store read failed");
                }
                if descriptor.fallback_to_local {
                    info!(entity = %kind, "falling back to local backend");
                    return self.fetch_local(descriptor, filters).await;
                }
                Vec::new()
            }
        }
    }

    async fn fetch_local(&self, descriptor: &EntityDescriptor, filters: &[Filter]) -> Vec<Record> {
        let params = native_params(descriptor, filters, Store::Local);
        match self.local.read(descriptor.local_resource, &params).await {
            // Endpoints may ignore query params, so filter again here.
            Ok(rows) => normalize_all(descriptor, &rows)
                .into_iter()
                .filter(|row| filters.iter().all(|f| f.matches(row)))
                .collect(),
            Err(err) => {
                error!(entity = %descriptor.kind, error = %err, "local backend read failed");
                Vec::new()
            }
        }
    }

    pub async fn fetch_products(&self, filters: &[Filter]) -> Vec<Record> {
        self.fetch(EntityKind::Product, filters).await
    }

    pub async fn fetch_sales(&self, filters: &[Filter]) -> Vec<Record> {
        self.fetch(EntityKind::Sale, filters).await
    }

    pub async fn fetch_users(&self, filters: &[Filter]) -> Vec<Record> {
        self.fetch(EntityKind::User, filters).await
    }

    pub async fn fetch_stock_entries(&self, filters: &[Filter]) -> Vec<Record> {
        self.fetch(EntityKind::StockEntry, filters).await
    }

    pub async fn fetch_audit_logs(&self, filters: &[Filter]) -> Vec<Record> {
        self.fetch(EntityKind::AuditLog, filters).await
    }

    /// Write one record.
    ///
    /// Online, the record is upserted into the hosted store. Offline (or when
    /// the hosted store turns out to be unreachable) it is created through the
    /// local backend and held in the sync queue for replay. Without a hosted
    /// store the local backend is the only destination and nothing is queued.
    pub async fn save(&self, kind: EntityKind, record: &Record) -> WriteOutcome {
        let descriptor = kind.descriptor();
        let canonical = normalize(descriptor, record);

        let Some(remote) = &self.remote else {
            return self.save_local_only(descriptor, &canonical).await;
        };
        if self.probe.get_status().use_remote {
            let row = to_store(descriptor, &canonical, Store::Remote);
            match remote
                .upsert(descriptor.remote_table, &[row], descriptor.native_key(Store::Remote))
                .await
            {
                Ok(()) => return WriteOutcome::Remote,
                Err(err) if err.is_network() => {
                    debug!(entity = %kind, error = %err, "hosted store unreachable; saving offline");
                    self.probe.report_network_error(&err);
                }
                Err(err) => {
                    warn!(entity = %kind, error = %err, "hosted store refused write");
                    return WriteOutcome::Rejected {
                        reason: err.to_string(),
                    };
                }
            }
        }

        self.save_offline(descriptor, canonical).await
    }

    async fn save_local_only(&self, descriptor: &EntityDescriptor, canonical: &Record) -> WriteOutcome {
        let local_row = to_store(descriptor, canonical, Store::Local);
        match self.local.create(descriptor.local_resource, &local_row).await {
            Ok(_) => WriteOutcome::Local,
            Err(err) => {
                error!(entity = %descriptor.kind, error = %err, "local backend write failed");
                WriteOutcome::Rejected {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn save_offline(&self, descriptor: &EntityDescriptor, mut canonical: Record) -> WriteOutcome {
        let kind = descriptor.kind;
        let local_row = to_store(descriptor, &canonical, Store::Local);
        let saved_locally = match self.local.create(descriptor.local_resource, &local_row).await {
            Ok(created) => {
                adopt_local_key(descriptor, &mut canonical, created);
                true
            }
            Err(err) => {
                error!(entity = %kind, error = %err, "local backend write failed");
                false
            }
        };

        match self.queue.add_to_queue(descriptor.remote_table, canonical).await {
            Ok(QueueOutcome::Queued { entry_id }) => WriteOutcome::Queued {
                entry_id,
                saved_locally,
            },
            Ok(QueueOutcome::DeadLettered { entry_id }) => WriteOutcome::DeadLettered {
                entry_id,
                saved_locally,
            },
            Ok(QueueOutcome::Sent) => WriteOutcome::Remote,
            Err(err) => {
                warn!(entity = %kind, saved_locally, error = %err, "write not queued for replay");
                WriteOutcome::Rejected {
                    reason: err.to_string(),
                }
            }
        }
    }

    pub fn probe(&self) -> &Arc<ConnectivityProbe> {
        &self.probe
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }
}

/// Map canonical filters onto `store` column names.
fn native_params(descriptor: &EntityDescriptor, filters: &[Filter], store: Store) -> Vec<Equality> {
    filters
        .iter()
        .filter_map(|f| {
            let column = f.native_field(descriptor, store).ok()?;
            Some((column.to_string(), f.value.clone()))
        })
        .collect()
}

/// Take the key the local backend assigned when the record came without one.
fn adopt_local_key(descriptor: &EntityDescriptor, canonical: &mut Record, created: Option<Value>) {
    if unique_key_value(descriptor, canonical).is_some() {
        return;
    }
    let key = match created {
        Some(Value::Object(row)) => unique_key_value(descriptor, &row),
        Some(scalar @ (Value::Number(_) | Value::String(_))) => Some(scalar),
        _ => None,
    };
    if let Some(key) = key {
        canonical.insert(descriptor.unique_key.to_string(), key);
    }
}

impl std::fmt::Debug for DataRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataRouter")
            .field("status", &self.probe.get_status())
            .field("has_remote", &self.remote.is_some())
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProbeConfig, RetryPolicy};
    use crate::local::InMemoryLocalBackend;
    use crate::network::HostNetwork;
    use crate::remote::InMemoryRemoteStore;
    use serde_json::json;
    use std::time::Duration;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    struct Fixture {
        remote: Arc<InMemoryRemoteStore>,
        local: Arc<InMemoryLocalBackend>,
        router: DataRouter,
    }

    fn fixture(online: bool, remote: InMemoryRemoteStore, local: InMemoryLocalBackend) -> Fixture {
        let network = Arc::new(HostNetwork::new(online));
        let remote = Arc::new(remote);
        let local = Arc::new(local);
        let probe = Arc::new(ConnectivityProbe::new(
            ProbeConfig::default().with_cooldown(1, Duration::ZERO),
            network,
            Some(remote.clone()),
        ));
        let queue = Arc::new(SyncQueue::new(
            probe.clone(),
            Some(remote.clone()),
            RetryPolicy::unlimited(),
        ));
        let router = DataRouter::new(probe, Some(remote.clone()), local.clone(), queue);
        Fixture {
            remote,
            local,
            router,
        }
    }

    #[tokio::test]
    async fn remote_rows_come_back_canonical() {
        let remote = InMemoryRemoteStore::new().with_rows(
            "products",
            vec![record(json!({ "product_id": 1, "product_name": "Amoxicillin", "unit_price": 4.5 }))],
        );
        let f = fixture(true, remote, InMemoryLocalBackend::new());

        let rows = f.router.fetch_products(&[]).await;
        assert_eq!(rows, vec![record(json!({ "product_id": 1, "name": "Amoxicillin", "unit_price": 4.5 }))]);
        assert_eq!(f.local.reads(), 0);
    }

    #[tokio::test]
    async fn local_rows_are_filtered_on_canonical_names() {
        let local = InMemoryLocalBackend::new().with_rows(
            "sales",
            vec![
                record(json!({ "SaleID": 1, "SoldBy": "amina" })),
                record(json!({ "SaleID": 2, "SoldBy": "brian" })),
            ],
        );
        let f = fixture(false, InMemoryRemoteStore::new(), local);

        let rows = f.router.fetch_sales(&[Filter::eq("sold_by", "brian")]).await;
        assert_eq!(rows, vec![record(json!({ "sale_id": 2, "sold_by": "brian" }))]);
        assert_eq!(f.remote.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_filter_yields_nothing_without_io() {
        let f = fixture(true, InMemoryRemoteStore::new(), InMemoryLocalBackend::new());
        assert!(f.router.fetch_users(&[Filter::eq("password", "x")]).await.is_empty());
        assert_eq!(f.remote.calls(), 0);
        assert_eq!(f.local.reads(), 0);
    }

    #[tokio::test]
    async fn only_products_fall_back_to_local_on_remote_failure() {
        let local = InMemoryLocalBackend::new()
            .with_rows("products", vec![record(json!({ "ProductID": 3, "Particulars": "ORS sachet" }))])
            .with_rows("audit_logs", vec![record(json!({ "LogID": 1 }))]);
        let f = fixture(true, InMemoryRemoteStore::new(), local);
        f.remote.set_unreachable(true);

        let products = f.router.fetch_products(&[]).await;
        assert_eq!(products, vec![record(json!({ "product_id": 3, "name": "ORS sachet" }))]);

        // The products failure already flipped the probe; bring it back.
        f.remote.set_unreachable(false);
        f.router.probe().check_now().await;
        f.remote.set_unreachable(true);

        assert!(f.router.fetch_audit_logs(&[]).await.is_empty());
        assert_eq!(f.local.reads(), 1);
    }

    #[tokio::test]
    async fn local_failure_yields_empty() {
        let local = InMemoryLocalBackend::new();
        local.set_failing(true);
        let f = fixture(false, InMemoryRemoteStore::new(), local);
        assert!(f.router.fetch_stock_entries(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn online_save_upserts_remote() {
        let f = fixture(true, InMemoryRemoteStore::new(), InMemoryLocalBackend::new());
        let outcome = f
            .router
            .save(EntityKind::User, &record(json!({ "Username": "amina", "Role": "cashier" })))
            .await;
        assert_eq!(outcome, WriteOutcome::Remote);
        assert_eq!(
            f.remote.rows("users"),
            vec![record(json!({ "username": "amina", "role": "cashier" }))]
        );
        assert_eq!(f.local.writes(), 0);
    }

    #[tokio::test]
    async fn offline_save_goes_local_and_adopts_the_assigned_key() {
        let f = fixture(false, InMemoryRemoteStore::new(), InMemoryLocalBackend::new());
        let outcome = f
            .router
            .save(EntityKind::AuditLog, &record(json!({ "action": "login", "username": "amina" })))
            .await;

        assert!(matches!(outcome, WriteOutcome::Queued { saved_locally: true, .. }));
        assert_eq!(
            f.local.rows("audit_logs"),
            vec![record(json!({ "Action": "login", "Username": "amina" }))]
        );
        let held = f.router.queue().get_queue();
        assert_eq!(held[0].payload["log_id"], json!(1));
    }

    #[tokio::test]
    async fn unreachable_remote_on_save_falls_back_to_offline_path() {
        let f = fixture(true, InMemoryRemoteStore::new(), InMemoryLocalBackend::new());
        f.remote.set_unreachable(true);
        let outcome = f
            .router
            .save(EntityKind::Product, &record(json!({ "product_id": 8, "name": "Cetirizine" })))
            .await;

        assert!(matches!(outcome, WriteOutcome::Queued { saved_locally: true, .. }));
        assert!(!f.router.probe().get_status().is_online);
        assert_eq!(f.router.queue().get_queue_size(), 1);
    }

    #[tokio::test]
    async fn refused_remote_write_is_rejected_not_queued() {
        let f = fixture(true, InMemoryRemoteStore::new(), InMemoryLocalBackend::new());
        f.remote.reject_where("sale_id", json!("S-9"));
        let outcome = f
            .router
            .save(EntityKind::Sale, &record(json!({ "sale_id": "S-9" })))
            .await;
        assert!(matches!(outcome, WriteOutcome::Rejected { .. }));
        assert_eq!(f.router.queue().get_queue_size(), 0);
    }

    #[tokio::test]
    async fn without_a_hosted_store_writes_stay_local_and_nothing_is_queued() {
        let probe = Arc::new(ConnectivityProbe::new(
            ProbeConfig::default(),
            Arc::new(HostNetwork::new(true)),
            None,
        ));
        let queue = Arc::new(SyncQueue::new(probe.clone(), None, RetryPolicy::unlimited()));
        let local = Arc::new(InMemoryLocalBackend::new());
        let router = DataRouter::new(probe, None, local.clone(), queue.clone());

        for id in 1..=3 {
            let outcome = router
                .save(EntityKind::Product, &record(json!({ "product_id": id, "name": "Zinc" })))
                .await;
            assert_eq!(outcome, WriteOutcome::Local);
        }
        assert_eq!(local.writes(), 3);
        assert_eq!(queue.get_queue_size(), 0);
        assert_eq!(queue.retry_all().await.attempted, 0);
    }

    #[tokio::test]
    async fn exhausted_first_attempt_is_reported_as_dead_letter() {
        let network = Arc::new(HostNetwork::new(true));
        let remote = Arc::new(InMemoryRemoteStore::new());
        let local = Arc::new(InMemoryLocalBackend::new());
        let probe = Arc::new(ConnectivityProbe::new(
            ProbeConfig::default(),
            network,
            Some(remote.clone()),
        ));
        let queue = Arc::new(SyncQueue::new(probe.clone(), Some(remote.clone()), RetryPolicy::capped(1)));
        let router = DataRouter::new(probe.clone(), Some(remote.clone()), local, queue.clone());

        // Offline path with the store still marked usable: the queue's own
        // immediate send fails once and the cap of one is spent.
        remote.reject_where("sale_id", json!("S-3"));
        let outcome = router.save_offline(EntityKind::Sale.descriptor(), record(json!({ "sale_id": "S-3" }))).await;

        assert!(matches!(outcome, WriteOutcome::DeadLettered { saved_locally: true, .. }));
        assert_eq!(queue.get_queue_size(), 0);
        assert_eq!(queue.dead_letters().len(), 1);
    }
}
