//! Client configuration: store endpoints, probe cadence, queue retry policy.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection details for the hosted primary store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
    /// Table read by the reachability probe (one row, no filters).
    pub probe_table: String,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            probe_table: "products".to_string(),
        }
    }
}

/// Connectivity probe cadence and thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Deadline for the reachability query; later answers are ignored.
    pub probe_timeout: Duration,
    /// Poll interval while online.
    pub healthy_interval: Duration,
    /// Poll interval while offline or failing.
    pub failing_interval: Duration,
    /// Consecutive failures that start a cooldown.
    pub failure_threshold: u32,
    /// No reachability query is issued during this window.
    pub cooldown: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(1000),
            healthy_interval: Duration::from_secs(30),
            failing_interval: Duration::from_secs(60),
            failure_threshold: 1,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl ProbeConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_intervals(mut self, healthy: Duration, failing: Duration) -> Self {
        self.healthy_interval = healthy;
        self.failing_interval = failing;
        self
    }

    pub fn with_cooldown(mut self, failure_threshold: u32, cooldown: Duration) -> Self {
        self.failure_threshold = failure_threshold.max(1);
        self.cooldown = cooldown;
        self
    }
}

/// Replay policy for queued writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Failed attempts after which an entry moves to the dead-letter list.
    /// `None` keeps entries until they succeed or the queue is cleared.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unlimited() -> Self {
        Self { max_attempts: None }
    }

    pub fn capped(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    /// Whether an entry with `attempts` failures should be dead-lettered.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Where queued writes are journaled, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JournalLocation {
    /// Queue lives in memory for the lifetime of the process.
    #[default]
    Disabled,
    /// `{data_dir}/pharmapos/sync_queue.db`.
    Default,
    Path(PathBuf),
}

/// Full client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `None` means every read and write goes to the local backend.
    pub remote: Option<RemoteConfig>,
    pub local_api_url: String,
    pub probe: ProbeConfig,
    pub retry: RetryPolicy,
    pub journal: JournalLocation,
    /// Per-request timeout for data calls; `None` keeps the HTTP client default.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote: None,
            local_api_url: "http://localhost/pharmacy/api".to_string(),
            probe: ProbeConfig::default(),
            retry: RetryPolicy::default(),
            journal: JournalLocation::default(),
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Build from `PHARMAPOS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get("PHARMAPOS_REMOTE_URL") {
            let api_key = get("PHARMAPOS_REMOTE_KEY").unwrap_or_default();
            let mut remote = RemoteConfig::new(url, api_key);
            if let Some(table) = get("PHARMAPOS_PROBE_TABLE") {
                remote.probe_table = table;
            }
            config.remote = Some(remote);
        }

        if let Some(url) = get("PHARMAPOS_LOCAL_API_URL") {
            config.local_api_url = url;
        }

        if let Some(v) = get("PHARMAPOS_PROBE_TIMEOUT_MS") {
            config.probe.probe_timeout = Duration::from_millis(parse("PHARMAPOS_PROBE_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = get("PHARMAPOS_HEALTHY_INTERVAL_SECS") {
            config.probe.healthy_interval = Duration::from_secs(parse("PHARMAPOS_HEALTHY_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("PHARMAPOS_FAILING_INTERVAL_SECS") {
            config.probe.failing_interval = Duration::from_secs(parse("PHARMAPOS_FAILING_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("PHARMAPOS_FAILURE_THRESHOLD") {
            config.probe.failure_threshold = parse::<u32>("PHARMAPOS_FAILURE_THRESHOLD", &v)?.max(1);
        }
        if let Some(v) = get("PHARMAPOS_COOLDOWN_SECS") {
            config.probe.cooldown = Duration::from_secs(parse("PHARMAPOS_COOLDOWN_SECS", &v)?);
        }
        if let Some(v) = get("PHARMAPOS_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Some(Duration::from_secs(parse("PHARMAPOS_REQUEST_TIMEOUT_SECS", &v)?));
        }

        if let Some(v) = get("PHARMAPOS_QUEUE_MAX_ATTEMPTS") {
            config.retry = match v.trim() {
                "unlimited" | "none" | "0" => RetryPolicy::unlimited(),
                other => RetryPolicy::capped(parse("PHARMAPOS_QUEUE_MAX_ATTEMPTS", other)?),
            };
        }

        if let Some(v) = get("PHARMAPOS_QUEUE_JOURNAL") {
            config.journal = match v.trim() {
                "off" | "false" | "memory" => JournalLocation::Disabled,
                "default" | "on" | "true" => JournalLocation::Default,
                path => JournalLocation::Path(PathBuf::from(path)),
            };
        }

        Ok(config)
    }

    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_local_api_url(mut self, url: impl Into<String>) -> Self {
        self.local_api_url = url.into();
        self
    }

    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_journal(mut self, journal: JournalLocation) -> Self {
        self.journal = journal;
        self
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_local_only_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert!(config.remote.is_none());
        assert_eq!(config.probe.probe_timeout, Duration::from_secs(1));
        assert!(config.probe.healthy_interval < config.probe.failing_interval);
        assert_eq!(config.retry.max_attempts, None);
    }

    #[test]
    fn reads_remote_and_probe_settings() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("PHARMAPOS_REMOTE_URL", "https://example.supabase.co"),
            ("PHARMAPOS_REMOTE_KEY", "anon-key"),
            ("PHARMAPOS_PROBE_TABLE", "users"),
            ("PHARMAPOS_PROBE_TIMEOUT_MS", "750"),
            ("PHARMAPOS_FAILURE_THRESHOLD", "3"),
            ("PHARMAPOS_QUEUE_MAX_ATTEMPTS", "10"),
            ("PHARMAPOS_QUEUE_JOURNAL", "/tmp/q.db"),
        ]))
        .unwrap();

        let remote = config.remote.unwrap();
        assert_eq!(remote.url, "https://example.supabase.co");
        assert_eq!(remote.api_key, "anon-key");
        assert_eq!(remote.probe_table, "users");
        assert_eq!(config.probe.probe_timeout, Duration::from_millis(750));
        assert_eq!(config.probe.failure_threshold, 3);
        assert_eq!(config.retry, RetryPolicy::capped(10));
        assert_eq!(config.journal, JournalLocation::Path(PathBuf::from("/tmp/q.db")));
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = ClientConfig::from_lookup(lookup(&[("PHARMAPOS_COOLDOWN_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PHARMAPOS_COOLDOWN_SECS", .. }));
    }

    #[test]
    fn retry_policy_exhaustion() {
        assert!(!RetryPolicy::unlimited().exhausted(u32::MAX));
        assert!(!RetryPolicy::capped(3).exhausted(2));
        assert!(RetryPolicy::capped(3).exhausted(3));
    }
}
