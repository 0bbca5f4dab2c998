//! Consumer-side view of the probe status.
//!
//! A [`StatusHook`] subscribes once and keeps the latest status at hand, so
//! screens can render an indicator and gate their loading logic without
//! talking to the probe directly.

use std::sync::{Arc, Mutex};

use pharmapos_core::Store;
use tokio::sync::watch;

use crate::lock::lock;
use crate::offline::{ConnectivityProbe, ConnectivityStatus, Subscription};

pub struct StatusHook {
    latest: Arc<Mutex<ConnectivityStatus>>,
    changes: watch::Receiver<ConnectivityStatus>,
    _subscription: Subscription,
}

impl StatusHook {
    /// Subscribe to `probe`. The hook holds the current status from the start.
    pub fn new(probe: &ConnectivityProbe) -> Self {
        let changes = probe.watch();
        let latest = Arc::new(Mutex::new(*changes.borrow()));
        let sink = latest.clone();
        let subscription = probe.subscribe(move |status| *lock(&sink) = *status);
        Self {
            latest,
            changes,
            _subscription: subscription,
        }
    }

    pub fn status(&self) -> ConnectivityStatus {
        *lock(&self.latest)
    }

    /// Store that reads and writes go to right now.
    pub fn active_store(&self) -> Store {
        if self.status().use_remote {
            Store::Remote
        } else {
            Store::Local
        }
    }

    /// One-line indicator text, e.g. `online (remote)`.
    pub fn indicator(&self) -> String {
        let status = self.status();
        let state = if status.is_online { "online" } else { "offline" };
        format!("{state} ({})", self.active_store())
    }

    /// Wait for the next status change. Returns `None` once the probe is gone.
    pub async fn changed(&mut self) -> Option<ConnectivityStatus> {
        self.changes.changed().await.ok()?;
        Some(*self.changes.borrow_and_update())
    }
}

impl std::fmt::Debug for StatusHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusHook").field("status", &self.status()).finish()
    }
}
