//! HTTP client for the local backend API.

use async_trait::async_trait;
use pharmapos_core::Record;
use pharmapos_core::filter::value_text;
use serde_json::Value;

use super::{ApiEnvelope, LocalBackend, rows_from_data};
use crate::error::ClientError;
use crate::remote::Equality;

/// Client for endpoints laid out as `{base}/{resource}/{action}.php`.
#[derive(Debug, Clone)]
pub struct HttpLocalBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLocalBackend {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn endpoint(&self, resource: &str, action: &str) -> String {
        format!("{}/{}/{}.php", self.base_url, resource, action)
    }

    async fn envelope(&self, req: reqwest::RequestBuilder) -> Result<ApiEnvelope, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            // The backend reports validation failures as 4xx with a normal
            // envelope; keep its message when there is one.
            if let Ok(env) = serde_json::from_str::<ApiEnvelope>(&body) {
                if !env.success {
                    return Err(ClientError::Backend(
                        env.message.unwrap_or_else(|| status.to_string()),
                    ));
                }
            }
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<ApiEnvelope>().await?)
    }
}

#[async_trait]
impl LocalBackend for HttpLocalBackend {
    async fn read(&self, resource: &str, params: &[Equality]) -> Result<Vec<Record>, ClientError> {
        let query: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.clone(), value_text(v)))
            .collect();
        let req = self.http.get(self.endpoint(resource, "read")).query(&query);
        rows_from_data(self.envelope(req).await?.into_data()?)
    }

    async fn create(&self, resource: &str, record: &Record) -> Result<Option<Value>, ClientError> {
        let req = self.http.post(self.endpoint(resource, "create")).json(record);
        self.envelope(req).await?.into_data()
    }
}
