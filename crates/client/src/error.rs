//! Client-side error model for store IO.

use pharmapos_core::DomainError;
use thiserror::Error;

/// Substrings that mark an error message as a connectivity failure rather than
/// a rejection by a reachable server.
const NETWORK_MARKERS: &[&str] = &[
    "failed to fetch",
    "networkerror",
    "network error",
    "network request failed",
    "load failed",
    "connection refused",
    "connection reset",
    "econnrefused",
    "enotfound",
    "dns error",
    "timed out",
    "timeout",
    "unreachable",
    "offline",
    "http 502",
    "http 503",
    "http 504",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("client is offline")]
    Offline,
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// The local backend answered with `success: false`.
    #[error("backend rejected request: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("remote store is not configured")]
    RemoteUnavailable,
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ClientError {
    /// Whether this failure means "the store could not be reached".
    ///
    /// Gateway errors count: the hosted store sits behind a proxy that answers
    /// 502-504 when the upstream is gone.
    pub fn is_network(&self) -> bool {
        match self {
            ClientError::Offline | ClientError::Network(_) | ClientError::Timeout => true,
            ClientError::Http { status, .. } => (502..=504).contains(status),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

/// Classify a free-form error message reported by a consumer.
pub fn is_network_error_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    NETWORK_MARKERS.iter().any(|m| lower.contains(m))
}
