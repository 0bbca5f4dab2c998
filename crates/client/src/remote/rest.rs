//! PostgREST-style HTTPS client for the hosted store.

use async_trait::async_trait;
use pharmapos_core::Record;
use pharmapos_core::filter::value_text;
use reqwest::header::{CONTENT_RANGE, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response};

use super::{Equality, RemoteStore};
use crate::config::RemoteConfig;
use crate::error::ClientError;

/// Client for a hosted table store exposing `/rest/v1/{table}`.
#[derive(Debug, Clone)]
pub struct RestRemoteStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    probe_table: String,
}

impl RestRemoteStore {
    pub fn new(http: reqwest::Client, config: &RemoteConfig) -> Self {
        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            probe_table: config.probe_table.clone(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        let mut headers = HeaderMap::new();
        if let Ok(key) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", key);
        }
        req.headers(headers).bearer_auth(&self.api_key)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, ClientError> {
        let resp = self.authorized(req).send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(ClientError::Http { status, body })
    }
}

fn eq_params(filters: &[Equality]) -> Vec<(String, String)> {
    std::iter::once(("select".to_string(), "*".to_string()))
        .chain(
            filters
                .iter()
                .map(|(column, value)| (column.clone(), format!("eq.{}", value_text(value)))),
        )
        .collect()
}

/// Total from a `Content-Range` header such as `0-24/311` or `*/0`.
fn parse_total(range: &str) -> Option<u64> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn ping(&self) -> Result<(), ClientError> {
        let req = self
            .http
            .get(self.table_url(&self.probe_table))
            .query(&[("select", "*"), ("limit", "1")]);
        self.send(req).await.map(|_| ())
    }

    async fn select(&self, table: &str, filters: &[Equality]) -> Result<Vec<Record>, ClientError> {
        let req = self.http.get(self.table_url(table)).query(&eq_params(filters));
        let resp = self.send(req).await?;
        Ok(resp.json::<Vec<Record>>().await?)
    }

    async fn insert(&self, table: &str, rows: &[Record]) -> Result<(), ClientError> {
        let req = self
            .http
            .post(self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(rows);
        self.send(req).await.map(|_| ())
    }

    async fn upsert(
        &self,
        table: &str,
        rows: &[Record],
        on_conflict: &str,
    ) -> Result<(), ClientError> {
        let req = self
            .http
            .post(self.table_url(table))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);
        self.send(req).await.map(|_| ())
    }

    async fn count(&self, table: &str) -> Result<u64, ClientError> {
        let req = self
            .http
            .head(self.table_url(table))
            .query(&[("select", "*")])
            .header("Prefer", "count=exact");
        let resp = self.send(req).await?;
        resp.headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_total)
            .ok_or_else(|| ClientError::Decode(format!("no row count in response for `{table}`")))
    }
}
