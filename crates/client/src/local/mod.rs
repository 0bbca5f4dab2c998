//! Local backend API (offline fallback store).

mod http;
mod memory;

use async_trait::async_trait;
use pharmapos_core::Record;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ClientError;
use crate::remote::Equality;

pub use http::HttpLocalBackend;
pub use memory::InMemoryLocalBackend;

/// Response body shape of every local endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiEnvelope {
    /// `data` on success, the backend's message as an error otherwise.
    pub fn into_data(self) -> Result<Option<Value>, ClientError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ClientError::Backend(
                self.message.unwrap_or_else(|| "request failed".to_string()),
            ))
        }
    }
}

/// Turn an envelope's `data` into rows. `null` or absent means no rows; a
/// single object is one row.
pub fn rows_from_data(data: Option<Value>) -> Result<Vec<Record>, ClientError> {
    match data {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(row)) => Ok(vec![row]),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(ClientError::Decode(format!("expected a row object, got {other}"))),
            })
            .collect(),
        Some(other) => Err(ClientError::Decode(format!("expected rows, got {other}"))),
    }
}

/// One endpoint per resource action, served over HTTP+JSON.
///
/// Resource and field names are the backend's native ones.
#[async_trait]
pub trait LocalBackend: Send + Sync {
    async fn read(&self, resource: &str, params: &[Equality]) -> Result<Vec<Record>, ClientError>;

    /// Create a row. Returns whatever the backend put in `data` (usually the
    /// inserted id or row).
    async fn create(&self, resource: &str, record: &Record) -> Result<Option<Value>, ClientError>;
}
