//! Logging configuration: level, output format, sink, suppression rules.

use std::str::FromStr;

use thiserror::Error;

/// Noisy dependency targets held at `warn` unless overridden.
const DEFAULT_SUPPRESS: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn", "sqlx=warn"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogConfigError {
    #[error("unknown log format `{0}` (expected json, pretty or compact)")]
    Format(String),
    #[error("unknown log sink `{0}` (expected stdout or stderr)")]
    Sink(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = LogConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" | "text" => Ok(Self::Compact),
            other => Err(LogConfigError::Format(other.to_string())),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LogSink {
    #[default]
    Stdout,
    Stderr,
}

impl FromStr for LogSink {
    type Err = LogConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            other => Err(LogConfigError::Sink(other.to_string())),
        }
    }
}

/// Logging configuration.
///
/// `suppress` holds `target=level` directives. Quietening a chatty module is
/// a filter rule here, never a change to the logging calls themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Base directive, e.g. `info` or `pharmapos_client=debug`.
    pub level: String,
    pub format: LogFormat,
    pub sink: LogSink,
    pub suppress: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            sink: LogSink::default(),
            suppress: DEFAULT_SUPPRESS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl LogConfig {
    /// Read `RUST_LOG`, `PHARMAPOS_LOG_FORMAT`, `PHARMAPOS_LOG_SINK` and
    /// `PHARMAPOS_LOG_SUPPRESS` (comma separated), defaulting what is unset.
    pub fn from_env() -> Result<Self, LogConfigError> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Apply whichever of the logging variables `lookup` knows on top of
    /// `self`; unset or blank variables keep the current value.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, LogConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(level) = get("RUST_LOG") {
            self.level = level;
        }
        if let Some(format) = get("PHARMAPOS_LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Some(sink) = get("PHARMAPOS_LOG_SINK") {
            self.sink = sink.parse()?;
        }
        if let Some(rules) = get("PHARMAPOS_LOG_SUPPRESS") {
            self.suppress.extend(split_rules(&rules));
        }

        Ok(self)
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_sink(mut self, sink: LogSink) -> Self {
        self.sink = sink;
        self
    }

    /// Add a `target=level` rule, e.g. `pharmapos_client::probe=warn`.
    pub fn suppress(mut self, rule: impl Into<String>) -> Self {
        self.suppress.push(rule.into());
        self
    }

    /// The full `EnvFilter` directive string. Later rules win over earlier ones
    /// for the same target, so suppression rules follow the base level.
    pub fn filter_directives(&self) -> String {
        std::iter::once(self.level.trim())
            .chain(self.suppress.iter().map(|s| s.trim()))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn split_rules(rules: &str) -> impl Iterator<Item = String> + '_ {
    rules
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}
