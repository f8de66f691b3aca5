//! Wix REST API client for cursor-paginated queries.
//!
//! Every query endpoint takes
//! `{"query": {"cursorPaging": {"limit": .., "cursor": ..}}}` and returns
//! its items under a resource-specific key plus
//! `pagingMetadata.cursors.next` while more pages remain.

mod retry;

use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;
use zeroize::Zeroizing;

pub use retry::RetryPolicy;

/// Largest page the query endpoints accept
pub const MAX_PAGE_SIZE: u32 = 100;

// ============================================================================
// Resources
// ============================================================================

/// Queryable Wix collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WixResource {
    Bookings,
    Contacts,
    Orders,
    Products,
}

impl WixResource {
    pub const ALL: [WixResource; 4] = [
        WixResource::Bookings,
        WixResource::Contacts,
        WixResource::Orders,
        WixResource::Products,
    ];

    /// Query endpoint path relative to the API base URL
    pub fn query_path(&self) -> &'static str {
        match self {
            Self::Bookings => "bookings/v1/bookings/query",
            Self::Contacts => "contacts/v1/contacts/query",
            Self::Orders => "stores/v1/orders/query",
            Self::Products => "stores/v1/products/query",
        }
    }

    /// Response key holding the page items
    pub fn items_key(&self) -> &'static str {
        self.as_str()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bookings => "bookings",
            Self::Contacts => "contacts",
            Self::Orders => "orders",
            Self::Products => "products",
        }
    }

    /// Parse a resource name, accepting singular forms
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bookings" | "booking" => Some(Self::Bookings),
            "contacts" | "contact" => Some(Self::Contacts),
            "orders" | "order" => Some(Self::Orders),
            "products" | "product" => Some(Self::Products),
            _ => None,
        }
    }
}

impl fmt::Display for WixResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub items: Vec<Value>,
    pub next_cursor: Option<String>,
}

impl QueryPage {
    /// Parse a query response body
    pub fn from_response(resource: WixResource, body: &Value) -> Self {
        let items = body
            .get(resource.items_key())
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let next_cursor = body
            .pointer("/pagingMetadata/cursors/next")
            .and_then(Value::as_str)
            .filter(|cursor| !cursor.is_empty())
            .map(str::to_string);

        Self { items, next_cursor }
    }
}

// ============================================================================
// Trait
// ============================================================================

/// Interface for paging through Wix collections
#[async_trait]
pub trait WixQueryApi: Send + Sync {
    /// Fetch one page of `resource`, starting at `cursor`
    async fn query_page(
        &self,
        resource: WixResource,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<QueryPage, ApiError>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for Wix API client behavior.
///
/// # Examples
///
/// ```
/// use wix_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::default()
///     .with_timeout(Duration::from_secs(60))
///     .with_site_id("site-123");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// User agent string for API requests
    pub user_agent: String,
    /// Request timeout duration
    pub timeout: Duration,
    /// Retry behavior for transient failures
    pub retry_policy: RetryPolicy,
    /// Wix API base URL
    pub api_base_url: String,
    /// Sent as `wix-site-id` when set
    pub site_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("salon-sync/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            api_base_url: "https://www.wixapis.com".to_string(),
            site_id: None,
        }
    }
}

impl ClientConfig {
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_site_id(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }
}

// ============================================================================
// Client
// ============================================================================

/// Wix REST API client.
#[derive(Clone)]
pub struct WixClient {
    http_client: reqwest::Client,
    base_url: Url,
    token: Zeroizing<String>,
    config: ClientConfig,
}

impl fmt::Debug for WixClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WixClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<REDACTED>")
            .field("config", &self.config)
            .finish()
    }
}

impl WixClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] when the base URL is invalid or
    /// the HTTP client cannot be built.
    pub fn new(config: ClientConfig, token: impl Into<String>) -> Result<Self, ApiError> {
        let base = format!("{}/", config.api_base_url.trim_end_matches('/'));
        let base_url = Url::parse(&base).map_err(|e| ApiError::Configuration {
            message: format!("invalid API base URL '{}': {}", config.api_base_url, e),
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ApiError::Configuration {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            base_url,
            token: Zeroizing::new(token.into()),
            config,
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn send_query(
        &self,
        resource: WixResource,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<QueryPage, ApiError> {
        let url = self
            .base_url
            .join(resource.query_path())
            .map_err(|e| ApiError::Configuration {
                message: format!("invalid query path: {}", e),
            })?;

        let mut paging = json!({ "limit": limit.clamp(1, MAX_PAGE_SIZE) });
        if let Some(cursor) = cursor {
            paging["cursor"] = Value::String(cursor.to_string());
        }
        let body = json!({ "query": { "cursorPaging": paging } });

        let mut request = self
            .http_client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.token.as_str()))
            .json(&body);
        if let Some(site_id) = &self.config.site_id {
            request = request.header("wix-site-id", site_id);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::HttpClientError(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(ApiError::from_status(status.as_u16(), message, retry_after));
        }

        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text)?;
        Ok(QueryPage::from_response(resource, &body))
    }
}

#[async_trait]
impl WixQueryApi for WixClient {
    #[instrument(skip(self), fields(resource = %resource))]
    async fn query_page(
        &self,
        resource: WixResource,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<QueryPage, ApiError> {
        let policy = &self.config.retry_policy;
        let mut attempt = 0;

        loop {
            match self.send_query(resource, cursor, limit).await {
                Ok(page) => {
                    debug!(
                        items = page.items.len(),
                        has_next = page.next_cursor.is_some(),
                        "Fetched page"
                    );
                    return Ok(page);
                }
                Err(e) if e.is_transient() && policy.should_retry(attempt) => {
                    attempt += 1;
                    let delay = e
                        .retry_after()
                        .map(|d| d.min(policy.max_delay))
                        .unwrap_or_else(|| policy.calculate_delay(attempt));
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient Wix API failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
