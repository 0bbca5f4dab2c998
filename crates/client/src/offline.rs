//! Offline mode detection and state management.
//!
//! [`ConnectivityProbe`] keeps a best-effort answer to "can we reach the
//! hosted store right now?". It combines three inputs:
//!
//! - the host network flag (an offline report is applied immediately, with no
//!   network call),
//! - a cheap reachability query against the hosted store, raced against a
//!   short deadline,
//! - network-shaped errors reported by consumers, which force an immediate
//!   down-transition.
//!
//! Probe failures never reach subscribers as errors, only as status changes.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::error::is_network_error_message;
use crate::lock::lock;
use crate::network::NetworkSignal;
use crate::remote::RemoteStore;

// Re-export from shared types module
pub use crate::types::{ConnectivityState, ConnectivityStatus};

type Listener = Arc<dyn Fn(&ConnectivityStatus) + Send + Sync>;
type Listeners = Mutex<Vec<(u64, Listener)>>;

/// Result of a single probe tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The reachability query answered in time.
    Reachable,
    /// The query failed or missed its deadline.
    Unreachable,
    /// Host reports no network; no query was issued.
    HostOffline,
    /// Inside a cooldown window; no query was issued.
    CoolingDown,
    /// No hosted store is configured; status follows the host flag only.
    NoRemote,
    /// A previous tick is still in flight.
    Skipped,
}

struct ProbeState {
    status: ConnectivityStatus,
    /// Bumped on every status change.
    version: u64,
    failure_streak: u32,
    cooldown_until: Option<Instant>,
}

/// Connectivity probe service.
///
/// Constructed once by the composition root and shared by `Arc`.
pub struct ConnectivityProbe {
    config: ProbeConfig,
    network: Arc<dyn NetworkSignal>,
    remote: Option<Arc<dyn RemoteStore>>,
    state: Mutex<ProbeState>,
    in_flight: AtomicBool,
    listeners: Arc<Listeners>,
    next_listener: AtomicU64,
    watch_tx: watch::Sender<ConnectivityStatus>,
    /// Last state version handed to the watch channel and listeners.
    published: Mutex<u64>,
    wake: Notify,
}

impl std::fmt::Debug for ConnectivityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityProbe")
            .field("config", &self.config)
            .field("status", &self.lock_state().status)
            .field("has_remote", &self.remote.is_some())
            .finish()
    }
}

/// Clears the single-flight flag when a tick ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ConnectivityProbe {
    /// The initial state follows the host network flag.
    pub fn new(
        config: ProbeConfig,
        network: Arc<dyn NetworkSignal>,
        remote: Option<Arc<dyn RemoteStore>>,
    ) -> Self {
        let online = network.is_online();
        let status = ConnectivityStatus {
            is_online: online,
            use_remote: online && remote.is_some(),
            last_checked: Utc::now(),
        };
        let (watch_tx, _) = watch::channel(status);

        Self {
            config,
            network,
            remote,
            state: Mutex::new(ProbeState {
                status,
                version: 0,
                failure_streak: 0,
                cooldown_until: None,
            }),
            in_flight: AtomicBool::new(false),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(0),
            watch_tx,
            published: Mutex::new(0),
            wake: Notify::new(),
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    fn lock_state(&self) -> MutexGuard<'_, ProbeState> {
        lock(&self.state)
    }

    /// Current status.
    ///
    /// A host offline flag is applied here even if no event was delivered, so
    /// the very next read after the network drops says offline.
    pub fn get_status(&self) -> ConnectivityStatus {
        let status = self.lock_state().status;
        if status.is_online && !self.network.is_online() {
            self.set_status(false, "host network reported offline");
            return self.lock_state().status;
        }
        status
    }

    pub fn state(&self) -> ConnectivityState {
        self.get_status().state()
    }

    /// Register a listener. It is called right away with the current status
    /// and again on every change until the returned handle is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectivityStatus) + Send + Sync + 'static,
    {
        let status = self.get_status();
        let listener: Listener = Arc::new(listener);
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, listener.clone()));
        listener(&status);

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Async alternative to [`subscribe`](Self::subscribe).
    pub fn watch(&self) -> watch::Receiver<ConnectivityStatus> {
        self.watch_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Force an immediate down-transition if `err` looks like a connectivity
    /// failure. Returns whether the status changed.
    pub fn report_network_error(&self, err: impl Display) -> bool {
        let message = err.to_string();
        if !is_network_error_message(&message) {
            debug!(%message, "ignoring non-network error report");
            return false;
        }
        self.record_failure();
        self.set_status(false, "consumer reported a network error")
    }

    /// Host online/offline event.
    ///
    /// Offline applies immediately. Online only wakes the poller: the hosted
    /// store has to answer a probe before the status flips back.
    pub fn network_changed(&self, online: bool) {
        if online {
            debug!("host network reported online; waking probe");
            self.wake.notify_one();
        } else {
            self.set_status(false, "host network reported offline");
        }
    }

    pub(crate) async fn woken(&self) {
        self.wake.notified().await;
    }

    pub fn in_cooldown(&self) -> bool {
        self.cooldown_remaining().is_some()
    }

    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let until = self.lock_state().cooldown_until?;
        until.checked_duration_since(Instant::now()).filter(|d| !d.is_zero())
    }

    /// How long the poller should wait before the next tick.
    pub fn next_interval(&self) -> Duration {
        if self.lock_state().status.is_online {
            self.config.healthy_interval
        } else {
            self.config.failing_interval
        }
    }

    /// Run one probe tick.
    ///
    /// The reachability query runs in its own task and races the configured
    /// deadline. A query that loses the race is not aborted; its answer is
    /// simply ignored.
    pub async fn check_now(&self) -> ProbeOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("probe already in flight; skipping tick");
            return ProbeOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        if !self.network.is_online() {
            self.set_status(false, "host network reported offline");
            return ProbeOutcome::HostOffline;
        }

        let Some(remote) = self.remote.clone() else {
            self.set_status(true, "host network online; no hosted store configured");
            return ProbeOutcome::NoRemote;
        };

        if let Some(remaining) = self.cooldown_remaining() {
            debug!(?remaining, "probe cooling down; skipping reachability query");
            self.touch();
            return ProbeOutcome::CoolingDown;
        }

        let query = tokio::spawn(async move { remote.ping().await });
        let result = match tokio::time::timeout(self.config.probe_timeout, query).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(err.to_string()),
            Ok(Err(join)) => Err(format!("probe task failed: {join}")),
            Err(_) => Err(format!("no answer within {:?}", self.config.probe_timeout)),
        };

        match result {
            Ok(()) if self.network.is_online() => {
                {
                    let mut state = self.lock_state();
                    state.failure_streak = 0;
                    state.cooldown_until = None;
                }
                self.set_status(true, "reachability query succeeded");
                ProbeOutcome::Reachable
            }
            Ok(()) => {
                self.set_status(false, "host network went offline during probe");
                ProbeOutcome::HostOffline
            }
            Err(reason) => {
                let streak = self.record_failure();
                debug!(%reason, streak, "reachability query failed");
                self.set_status(false, "reachability query failed");
                ProbeOutcome::Unreachable
            }
        }
    }

    /// Bump the failure streak, opening a cooldown window once it reaches the
    /// threshold.
    fn record_failure(&self) -> u32 {
        let mut state = self.lock_state();
        state.failure_streak = state.failure_streak.saturating_add(1);
        if state.failure_streak >= self.config.failure_threshold {
            state.cooldown_until = Some(Instant::now() + self.config.cooldown);
        }
        state.failure_streak
    }

    fn touch(&self) {
        self.lock_state().status.last_checked = Utc::now();
    }

    /// Apply a new online flag. Listeners run only when something changed.
    fn set_status(&self, online: bool, reason: &str) -> bool {
        let use_remote = online && self.remote.is_some();
        let changed = {
            let mut state = self.lock_state();
            let changed =
                state.status.is_online != online || state.status.use_remote != use_remote;
            state.status = ConnectivityStatus {
                is_online: online,
                use_remote,
                last_checked: Utc::now(),
            };
            if changed {
                state.version += 1;
            }
            changed
        };

        if changed {
            if online {
                info!(reason, use_remote, "connectivity: online");
            } else {
                warn!(reason, "connectivity: offline");
            }
            self.publish_latest();
        }
        changed
    }

    /// Hand the newest status to the watch channel and listeners.
    ///
    /// One caller publishes at a time and always publishes what the state
    /// holds when it looks, so consumers end on the same status as
    /// `get_status`. A caller that finds publishing in progress (another
    /// thread, or a listener changing the status from inside its callback)
    /// leaves its change to the current publisher.
    fn publish_latest(&self) {
        loop {
            let mut published = match self.published.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };
            loop {
                let (status, version) = {
                    let state = self.lock_state();
                    (state.status, state.version)
                };
                if version == *published {
                    break;
                }
                *published = version;
                self.watch_tx.send_replace(status);
                let listeners: Vec<Listener> = lock(&self.listeners)
                    .iter()
                    .map(|(_, l)| l.clone())
                    .collect();
                for listener in listeners {
                    listener(&status);
                }
            }
            let seen = *published;
            drop(published);
            // A change that lost the race for the lock above is ours to send.
            if self.lock_state().version == seen {
                return;
            }
        }
    }
}

/// Handle returned by [`ConnectivityProbe::subscribe`].
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).retain(|(id, _)| *id != self.id);
        }
    }
}
