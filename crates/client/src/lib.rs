//! `pharmapos-client`
//!
//! **Responsibility:** Connectivity-aware routing between the hosted primary
//! store and the local backend.
//!
//! This crate provides:
//! - Connectivity probe (host flag, reachability query, reported errors)
//! - Per-entity data router that calls exactly one store per request
//! - Sync queue for writes that could not reach the hosted store
//! - Manual bulk sync and consistency checks
//!
//! The hosted store is the authority whenever it is reachable.

pub mod app;
pub mod config;
pub mod error;
pub mod hook;
pub mod journal;
pub mod local;
mod lock;
pub mod network;
pub mod offline;
pub mod remote;
pub mod router;
pub mod sync_manager;
pub mod sync_queue;
pub mod sync_worker;
pub mod types;

pub use app::AppState;
pub use config::{ClientConfig, ConfigError, JournalLocation, ProbeConfig, RemoteConfig, RetryPolicy};
pub use error::ClientError;
pub use hook::StatusHook;
pub use network::{HostNetwork, NetworkSignal};
pub use offline::{ConnectivityProbe, ConnectivityState, ConnectivityStatus, ProbeOutcome, Subscription};
pub use router::DataRouter;
pub use sync_manager::DataSyncManager;
pub use sync_queue::SyncQueue;
pub use sync_worker::{ProbeWorker, ProbeWorkerHandle};
pub use types::{
    ConsistencyReport, QueueOutcome, RetryReport, RowError, SyncQueueEntry, SyncTableReport, WriteOutcome,
};
