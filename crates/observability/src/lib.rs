//! Tracing and logging setup shared by every binary in the workspace.

mod config;

pub use config::{LogConfig, LogConfigError, LogFormat, LogSink};

/// Initialize process-wide logging from the environment.
///
/// An invalid logging variable is reported on stderr and the defaults are
/// used instead. This is safe to call multiple times; subsequent calls become
/// no-ops.
pub fn init() {
    let config = LogConfig::from_env().unwrap_or_else(|err| {
        eprintln!("invalid logging configuration, using defaults: {err}");
        LogConfig::default()
    });
    tracing::init(&config);
}

/// Initialize process-wide logging from an explicit configuration.
pub fn init_with(config: &LogConfig) {
    tracing::init(config);
}

/// Subscriber installation (filters, formats, sinks).
pub mod tracing;
