//! # PostgREST Data Store
//!
//! [`DataStore`] implementation over a Supabase PostgREST endpoint.
//!
//! - upsert: `POST /rest/v1/{table}?on_conflict={key}` with
//!   `Prefer: resolution=merge-duplicates,return=representation`
//! - update: `PATCH /rest/v1/{table}?{key}=eq.{value}`
//! - insert: `POST /rest/v1/{table}` with `Prefer: return=minimal`
//!
//! Every request carries the service key both as `apikey` and as a bearer
//! token.

use crate::store::{DataStore, Record, StoreError};
use crate::SecretString;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=representation";
const BATCH_UPSERT_PREFER: &str = "resolution=merge-duplicates,return=minimal";
const UPDATE_PREFER: &str = "return=representation";
const INSERT_PREFER: &str = "return=minimal";

/// Connection settings for a PostgREST endpoint
#[derive(Clone)]
pub struct PostgrestConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    pub service_key: SecretString,
    pub timeout: Duration,
}

impl PostgrestConfig {
    pub fn new(url: impl Into<String>, service_key: SecretString) -> Self {
        Self {
            url: url.into(),
            service_key,
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for PostgrestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgrestConfig")
            .field("url", &self.url)
            .field("service_key", &"<REDACTED>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// PostgREST-backed store
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    client: Client,
    base_url: Url,
    service_key: SecretString,
}

/// Render a JSON value as a PostgREST filter operand
fn filter_operand(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl PostgrestStore {
    /// Build the store and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Request`] when the URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: PostgrestConfig) -> Result<Self, StoreError> {
        let base = config.url.trim_end_matches('/');
        let base_url = Url::parse(&format!("{}/rest/v1/", base)).map_err(|e| StoreError::Request {
            message: format!("invalid datastore URL '{}': {}", config.url, e),
        })?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Request {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            service_key: config.service_key,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        self.base_url.join(table).map_err(|e| StoreError::Request {
            message: format!("invalid table name '{}': {}", table, e),
        })
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let key = self.service_key.expose_secret();
        self.client
            .request(method, url)
            .header("apikey", key)
            .header("Authorization", format!("Bearer {}", key))
            .header("Content-Type", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.send().await.map_err(|e| StoreError::Request {
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn rows(response: Response) -> Result<Vec<Record>, StoreError> {
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::UnexpectedResponse {
                message: format!("response is not JSON: {}", e),
            })?;

        match body {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect()),
            Value::Object(map) => Ok(vec![map]),
            other => Err(StoreError::UnexpectedResponse {
                message: format!("expected rows, got {}", other),
            }),
        }
    }
}

#[async_trait]
impl DataStore for PostgrestStore {
    #[instrument(skip(self, record), fields(table = %table, conflict_key = %conflict_key))]
    async fn upsert(
        &self,
        table: &str,
        record: Record,
        conflict_key: &str,
    ) -> Result<Record, StoreError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("on_conflict", conflict_key);

        let request = self
            .request(Method::POST, url)
            .header("Prefer", UPSERT_PREFER)
            .json(&Value::Object(record));
        let response = self.send(request).await?;

        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::UnexpectedResponse {
                message: "upsert returned no rows".to_string(),
            })
    }

    #[instrument(skip(self, records), fields(table = %table, conflict_key = %conflict_key, count = records.len()))]
    async fn upsert_batch(
        &self,
        table: &str,
        records: Vec<Record>,
        conflict_key: &str,
    ) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        // A declared column a row lacks is written as NULL, so each request
        // only carries rows with the same column set
        let mut groups: BTreeMap<Vec<String>, Vec<Record>> = BTreeMap::new();
        for record in records {
            let mut columns: Vec<String> = record.keys().cloned().collect();
            columns.sort();
            groups.entry(columns).or_default().push(record);
        }

        let mut count = 0;
        for (columns, rows) in groups {
            let mut url = self.table_url(table)?;
            url.query_pairs_mut()
                .append_pair("on_conflict", conflict_key)
                .append_pair("columns", &columns.join(","));

            count += rows.len();
            let body = Value::Array(rows.into_iter().map(Value::Object).collect());
            let request = self
                .request(Method::POST, url)
                .header("Prefer", BATCH_UPSERT_PREFER)
                .json(&body);
            self.send(request).await?;
        }

        debug!(table = %table, count, "Batch upserted");
        Ok(count)
    }

    #[instrument(skip(self, key_value, patch), fields(table = %table, key_column = %key_column))]
    async fn update(
        &self,
        table: &str,
        key_column: &str,
        key_value: &Value,
        patch: Record,
    ) -> Result<Vec<Record>, StoreError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair(key_column, &format!("eq.{}", filter_operand(key_value)));

        let request = self
            .request(Method::PATCH, url)
            .header("Prefer", UPDATE_PREFER)
            .json(&Value::Object(patch));
        let response = self.send(request).await?;

        Self::rows(response).await
    }

    #[instrument(skip(self, record), fields(table = %table))]
    async fn insert(&self, table: &str, record: Record) -> Result<(), StoreError> {
        let url = self.table_url(table)?;
        let request = self
            .request(Method::POST, url)
            .header("Prefer", INSERT_PREFER)
            .json(&Value::Object(record));
        self.send(request).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let request = self.request(Method::GET, self.base_url.clone());
        self.send(request).await.map(|_| ()).map_err(|e| match e {
            StoreError::Request { message } => StoreError::Unavailable { message },
            other => other,
        })
    }
}

#[cfg(test)]
#[path = "postgrest_store_tests.rs"]
mod tests;
