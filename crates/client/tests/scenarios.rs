use std::sync::{Arc, Mutex};
use std::time::Duration;

use pharmapos_client::local::InMemoryLocalBackend;
use pharmapos_client::remote::InMemoryRemoteStore;
use pharmapos_client::{
    AppState, ClientConfig, ConnectivityStatus, HostNetwork, ProbeOutcome, QueueOutcome, RemoteConfig,
};
use pharmapos_core::{EntityKind, Record};
use serde_json::{Value, json};

struct Harness {
    network: Arc<HostNetwork>,
    remote: Arc<InMemoryRemoteStore>,
    local: Arc<InMemoryLocalBackend>,
    state: AppState,
}

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn harness(host_online: bool) -> Harness {
    let network = Arc::new(HostNetwork::new(host_online));
    let remote = Arc::new(
        InMemoryRemoteStore::new()
            .with_rows("products", vec![record(json!({ "product_id": 1, "product_name": "Paracetamol" }))])
            .with_rows("sales", vec![record(json!({ "sale_id": "S-1", "total_amount": 12.5 }))]),
    );
    let local = Arc::new(
        InMemoryLocalBackend::new()
            .with_rows("products", vec![record(json!({ "ProductID": 1, "Particulars": "Paracetamol 500mg" }))])
            .with_rows("sales", vec![record(json!({ "SaleID": "S-1", "Amount": 12.5 }))]),
    );
    let config = ClientConfig::default().with_remote(RemoteConfig::new("https://db.example.org", "key"));
    let state = AppState::with_stores(&config, network.clone(), Some(remote.clone()), local.clone());
    Harness {
        network,
        remote,
        local,
        state,
    }
}

#[tokio::test]
async fn offline_fetches_touch_only_the_local_backend() {
    let h = harness(false);
    for kind in EntityKind::ALL {
        h.state.router.fetch(kind, &[]).await;
    }
    assert_eq!(h.remote.calls(), 0);
    assert_eq!(h.local.reads(), EntityKind::ALL.len());

    let products = h.state.router.fetch_products(&[]).await;
    assert_eq!(products, vec![record(json!({ "product_id": 1, "name": "Paracetamol 500mg" }))]);
}

#[tokio::test]
async fn host_offline_is_seen_on_the_next_read_without_a_query() {
    let h = harness(true);
    assert!(h.state.probe.get_status().is_online);

    // Flag flipped, no event delivered.
    h.network.set_online(false);
    let status = h.state.probe.get_status();
    assert!(!status.is_online);
    assert!(!status.use_remote);
    assert_eq!(h.remote.pings(), 0);
}

#[tokio::test]
async fn replay_keeps_only_failed_writes() {
    let h = harness(false);
    for id in 10..15 {
        let outcome = h
            .state
            .queue
            .add_to_queue("products", record(json!({ "ProductID": id, "Quantity": id })))
            .await
            .unwrap();
        assert!(matches!(outcome, QueueOutcome::Queued { .. }));
    }
    h.remote.reject_where("product_id", json!(12));

    h.network.set_online(true);
    assert_eq!(h.state.probe.check_now().await, ProbeOutcome::Reachable);
    let report = h.state.queue.retry_all().await;

    assert_eq!(report.succeeded, 4);
    assert_eq!(report.failed, 1);
    let left: Vec<Value> = h
        .state
        .queue
        .get_queue()
        .iter()
        .map(|e| e.payload["product_id"].clone())
        .collect();
    assert_eq!(left, vec![json!(12)]);
}

#[tokio::test]
async fn replaying_the_same_write_twice_converges() {
    let h = harness(false);
    let write = record(json!({ "sale_id": "S-7", "quantity": 2, "total_amount": 9.0 }));
    h.state.queue.add_to_queue("sales", write.clone()).await.unwrap();
    h.state.queue.add_to_queue("sales", write).await.unwrap();

    h.network.set_online(true);
    h.state.queue.retry_all().await;
    let once = h.remote.rows("sales");
    h.state.queue.add_to_queue("sales", record(json!({ "sale_id": "S-7", "quantity": 2, "total_amount": 9.0 })))
        .await
        .unwrap();
    h.state.queue.retry_all().await;

    assert_eq!(h.remote.rows("sales"), once);
    assert_eq!(
        once.iter().filter(|r| r["sale_id"] == json!("S-7")).count(),
        1
    );
}

#[tokio::test]
async fn subscribers_get_the_current_status_immediately() {
    let h = harness(true);
    let seen: Arc<Mutex<Vec<ConnectivityStatus>>> = Arc::default();
    let sink = seen.clone();
    let _sub = h.state.probe.subscribe(move |s| sink.lock().unwrap().push(*s));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].is_online);
}

#[tokio::test(start_paused = true)]
async fn fast_probe_answer_keeps_reads_on_the_hosted_store() {
    let h = harness(true);
    h.remote.set_ping_latency(Duration::from_millis(200));

    assert_eq!(h.state.probe.check_now().await, ProbeOutcome::Reachable);
    assert!(h.state.probe.get_status().is_online);

    let sales = h.state.router.fetch_sales(&[]).await;
    assert_eq!(sales, vec![record(json!({ "sale_id": "S-1", "total_amount": 12.5 }))]);
    assert_eq!(h.local.reads(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_probe_goes_offline_and_cools_down() {
    let h = harness(true);
    h.remote.set_ping_latency(Duration::from_millis(1500));

    assert_eq!(h.state.probe.check_now().await, ProbeOutcome::Unreachable);
    assert!(!h.state.probe.get_status().is_online);
    assert!(h.state.probe.in_cooldown());

    let calls_before = h.remote.calls();
    let products = h.state.router.fetch_products(&[]).await;
    assert_eq!(products.len(), 1);
    assert_eq!(h.local.reads(), 1);
    assert_eq!(h.remote.calls(), calls_before);

    assert_eq!(h.state.probe.check_now().await, ProbeOutcome::CoolingDown);
    assert_eq!(h.remote.pings(), 1);
}

#[tokio::test]
async fn writes_held_offline_drain_after_reconnect() {
    let h = harness(false);
    for (id, name) in [(101, "Cough syrup"), (102, "Vitamin C"), (103, "Antacid")] {
        h.state
            .queue
            .add_to_queue("products", record(json!({ "product_id": id, "name": name })))
            .await
            .unwrap();
    }
    assert_eq!(h.state.queue.get_queue_size(), 3);

    h.state.set_network_online(true);
    assert_eq!(h.state.probe.check_now().await, ProbeOutcome::Reachable);
    let report = h.state.queue.retry_all().await;

    assert_eq!(report.succeeded, 3);
    assert_eq!(h.state.queue.get_queue_size(), 0);
    assert_eq!(h.remote.rows("products").len(), 4);
}

#[tokio::test]
async fn reported_fetch_failure_flips_status_before_the_next_poll() {
    let h = harness(true);
    assert!(h.state.probe.get_status().is_online);

    assert!(h.state.probe.report_network_error("TypeError: Failed to fetch"));
    assert!(!h.state.probe.get_status().is_online);
    assert_eq!(h.remote.pings(), 0);
}

#[tokio::test(start_paused = true)]
async fn read_that_outlives_a_flip_to_offline_returns_the_hosted_answer() {
    let h = harness(true);
    h.remote.set_call_latency(Duration::from_millis(500));

    let router = h.state.router.clone();
    let read = tokio::spawn(async move { router.fetch_sales(&[]).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.remote.calls(), 1);

    h.state.set_network_online(false);
    assert!(!h.state.probe.get_status().is_online);

    let sales = read.await.unwrap();
    assert_eq!(sales, vec![record(json!({ "sale_id": "S-1", "total_amount": 12.5 }))]);
    assert_eq!(h.local.reads(), 0);
}

#[tokio::test(start_paused = true)]
async fn late_ping_keeps_running_after_the_deadline() {
    let h = harness(true);
    h.remote.set_ping_latency(Duration::from_millis(1500));

    assert_eq!(h.state.probe.check_now().await, ProbeOutcome::Unreachable);
    assert_eq!(h.remote.pings(), 1);
    assert_eq!(h.remote.pings_answered(), 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.remote.pings_answered(), 1);
    // The late answer is not applied.
    assert!(!h.state.probe.get_status().is_online);
}
