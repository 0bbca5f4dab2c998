//! Composition root: builds the probe, stores, queue, router and sync manager
//! from a [`ClientConfig`] and hands out shared references.

use std::sync::Arc;

use anyhow::Context;

use crate::config::{ClientConfig, JournalLocation};
use crate::journal::{QueueJournal, default_journal_path};
use crate::local::{HttpLocalBackend, LocalBackend};
use crate::network::HostNetwork;
use crate::offline::ConnectivityProbe;
use crate::remote::{RemoteStore, RestRemoteStore};
use crate::router::DataRouter;
use crate::sync_manager::DataSyncManager;
use crate::sync_queue::SyncQueue;
use crate::sync_worker::{ProbeWorker, ProbeWorkerHandle};

/// Application state shared by every consumer.
#[derive(Clone, Debug)]
pub struct AppState {
    pub network: Arc<HostNetwork>,
    pub probe: Arc<ConnectivityProbe>,
    pub queue: Arc<SyncQueue>,
    pub router: Arc<DataRouter>,
    pub sync_manager: Arc<DataSyncManager>,
}

impl AppState {
    /// Wire real HTTP clients from `config`, open the queue journal if one is
    /// configured and restore whatever it holds.
    pub async fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        let mut http = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            http = http.timeout(timeout);
        }
        let http = http.build().context("failed to build HTTP client")?;

        let remote: Option<Arc<dyn RemoteStore>> = config
            .remote
            .as_ref()
            .map(|remote| Arc::new(RestRemoteStore::new(http.clone(), remote)) as Arc<dyn RemoteStore>);
        if remote.is_none() {
            tracing::warn!("no hosted store configured; all traffic goes to the local backend");
        }
        let local: Arc<dyn LocalBackend> =
            Arc::new(HttpLocalBackend::new(http, config.local_api_url.clone()));

        let journal = match &config.journal {
            JournalLocation::Disabled => None,
            JournalLocation::Default => {
                let path = default_journal_path().context("failed to resolve queue journal path")?;
                Some(open_journal(&path).await?)
            }
            JournalLocation::Path(path) => Some(open_journal(path).await?),
        };

        let state = Self::assemble(config, Arc::new(HostNetwork::default()), remote, local, journal);
        state.queue.restore().await;
        Ok(state)
    }

    /// Wire caller-supplied stores (in-memory fakes, alternative transports).
    pub fn with_stores(
        config: &ClientConfig,
        network: Arc<HostNetwork>,
        remote: Option<Arc<dyn RemoteStore>>,
        local: Arc<dyn LocalBackend>,
    ) -> Self {
        Self::assemble(config, network, remote, local, None)
    }

    fn assemble(
        config: &ClientConfig,
        network: Arc<HostNetwork>,
        remote: Option<Arc<dyn RemoteStore>>,
        local: Arc<dyn LocalBackend>,
        journal: Option<QueueJournal>,
    ) -> Self {
        let probe = Arc::new(ConnectivityProbe::new(
            config.probe.clone(),
            network.clone(),
            remote.clone(),
        ));

        let mut queue = SyncQueue::new(probe.clone(), remote.clone(), config.retry);
        if let Some(journal) = journal {
            queue = queue.with_journal(journal);
        }
        let queue = Arc::new(queue);

        let router = Arc::new(DataRouter::new(
            probe.clone(),
            remote.clone(),
            local.clone(),
            queue.clone(),
        ));
        let sync_manager = Arc::new(DataSyncManager::new(probe.clone(), remote, local).with_all_tables());

        Self {
            network,
            probe,
            queue,
            router,
            sync_manager,
        }
    }

    /// Forward a native online/offline event from the host.
    pub fn set_network_online(&self, online: bool) {
        let was = self.network.set_online(online);
        if was != online {
            self.probe.network_changed(online);
        }
    }

    /// Start the background probe loop, replaying the queue on reconnect.
    pub fn start_worker(&self) -> ProbeWorkerHandle {
        ProbeWorker::new(self.probe.clone())
            .with_queue(self.queue.clone())
            .start()
    }
}

async fn open_journal(path: &std::path::Path) -> anyhow::Result<QueueJournal> {
    QueueJournal::open(path)
        .await
        .with_context(|| format!("failed to open queue journal at {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::InMemoryLocalBackend;
    use crate::offline::ConnectivityState;
    use crate::remote::InMemoryRemoteStore;

    #[tokio::test]
    async fn without_remote_everything_is_local() {
        let state = AppState::from_config(&ClientConfig::default()).await.unwrap();
        let status = state.probe.get_status();
        assert!(status.is_online);
        assert!(!status.use_remote);
        assert_eq!(state.sync_manager.registered_tables().len(), 5);
    }

    #[test]
    fn host_events_reach_the_probe() {
        let state = AppState::with_stores(
            &ClientConfig::default(),
            Arc::new(HostNetwork::new(true)),
            Some(Arc::new(InMemoryRemoteStore::new())),
            Arc::new(InMemoryLocalBackend::new()),
        );
        assert_eq!(state.probe.state(), ConnectivityState::Online);
        state.set_network_online(false);
        assert_eq!(state.probe.state(), ConnectivityState::Offline);
    }
}
