//! Background worker that drives the connectivity probe.
//!
//! Each tick runs one probe check and then sleeps for the probe's current
//! interval. A host "online" event cuts the sleep short. When the hosted store
//! becomes usable again, held writes are replayed.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::offline::{ConnectivityProbe, ProbeOutcome};
use crate::sync_queue::SyncQueue;

pub struct ProbeWorker {
    probe: Arc<ConnectivityProbe>,
    queue: Option<Arc<SyncQueue>>,
}

/// Running worker. Dropping it leaves the task running; call [`stop`](Self::stop).
#[derive(Debug)]
pub struct ProbeWorkerHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl ProbeWorker {
    pub fn new(probe: Arc<ConnectivityProbe>) -> Self {
        Self { probe, queue: None }
    }

    /// Replay `queue` whenever the hosted store comes back.
    pub fn with_queue(mut self, queue: Arc<SyncQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Spawn the polling loop on the current runtime.
    pub fn start(self) -> ProbeWorkerHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();
        let Self { probe, queue } = self;

        let join = tokio::spawn(async move {
            tracing::info!("connectivity worker started");
            let mut was_remote = probe.get_status().use_remote;

            loop {
                let outcome = probe.check_now().await;
                let use_remote = probe.get_status().use_remote;
                tracing::debug!(?outcome, use_remote, "probe tick");

                if let Some(queue) = &queue {
                    let recovered = use_remote && !was_remote;
                    let first_tick_backlog =
                        use_remote && outcome == ProbeOutcome::Reachable && queue.get_queue_size() > 0;
                    if recovered || first_tick_backlog {
                        let report = queue.retry_all().await;
                        tracing::info!(
                            succeeded = report.succeeded,
                            remaining = report.remaining,
                            "replayed held writes after reconnect"
                        );
                    }
                }
                was_remote = use_remote;

                let pause = probe.next_interval();
                tokio::select! {
                    _ = signal.notified() => break,
                    _ = tokio::time::sleep(pause) => {}
                    _ = probe.woken() => {
                        tracing::debug!("woken by host network event");
                    }
                }
            }

            tracing::info!("connectivity worker stopped");
        });

        ProbeWorkerHandle { shutdown, join }
    }
}

impl ProbeWorkerHandle {
    /// Signal shutdown and wait for the loop to exit.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.join.await {
            tracing::error!(error = %err, "connectivity worker panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
