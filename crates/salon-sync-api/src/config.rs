//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use salon_sync_core::{PostgrestConfig, SecretString, TableNames};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use url::Url;
use wix_client::{ClientConfig, RetryPolicy};

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "SALON_SYNC_CONFIG_FILE";

/// Prefix for `SALON_SYNC__SECTION__KEY` environment overrides
pub const ENV_PREFIX: &str = "SALON_SYNC";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Webhook processing settings
    pub webhooks: WebhookConfig,

    /// Security settings
    pub security: SecurityConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Relational store connection
    pub datastore: DatastoreConfig,

    /// Wix REST API access for bulk sync
    pub wix: WixConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub enable_cors: bool,

    /// Enable compression
    pub enable_compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 2 * 1024 * 1024, // 2MB
            enable_cors: false,
            enable_compression: true,
        }
    }
}

/// Webhook processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Best-effort endpoint path
    pub router_path: String,

    /// Strict endpoint path
    pub strict_path: String,

    /// Header carrying the HMAC signature
    pub signature_header: String,

    /// Shared HMAC secret; signatures are not checked when empty
    pub secret: SecretString,

    /// Longest string kept by the sanitizer, in characters
    pub max_string_length: usize,

    /// Store the sanitized payload in the webhook log
    pub log_payloads: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            router_path: "/api/webhook-router".to_string(),
            strict_path: "/api/wix-webhook".to_string(),
            signature_header: "x-wix-signature".to_string(),
            secret: SecretString::default(),
            max_string_length: 10_000,
            log_payloads: true,
        }
    }
}

impl WebhookConfig {
    /// The configured secret, if any
    pub fn signature_secret(&self) -> Option<&SecretString> {
        Some(&self.secret).filter(|s| !s.is_empty())
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable IP-based rate limiting on the webhook endpoints
    pub enable_ip_rate_limiting: bool,

    /// IP rate limit (requests per minute per IP)
    pub ip_rate_limit: u32,

    /// Key the rate limit on `x-forwarded-for` instead of the socket peer.
    ///
    /// Only enable behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,

    /// Enable request logging
    pub log_requests: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_ip_rate_limiting: false,
            ip_rate_limit: 100,
            trust_forwarded_for: false,
            log_requests: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Datastore configuration
///
/// Without a `url` the service falls back to the in-memory store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Supabase project URL
    pub url: Option<String>,

    /// Service role key
    pub service_key: SecretString,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Destination table names
    pub tables: TableNames,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key: SecretString::default(),
            timeout_seconds: 20,
            tables: TableNames::default(),
        }
    }
}

impl DatastoreConfig {
    /// PostgREST settings, when a URL is configured
    pub fn postgrest_config(&self) -> Option<PostgrestConfig> {
        let url = self.url.as_deref().filter(|u| !u.trim().is_empty())?;
        Some(
            PostgrestConfig::new(url, self.service_key.clone())
                .with_timeout(Duration::from_secs(self.timeout_seconds)),
        )
    }
}

/// Wix API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WixConfig {
    /// API base URL
    pub api_base_url: String,

    /// API key sent as a bearer token
    pub token: SecretString,

    /// Sent as `wix-site-id` when set
    pub site_id: Option<String>,

    /// Items requested per query page
    pub page_size: u32,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Retries for transient API failures
    pub max_retries: u32,
}

impl Default for WixConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.wixapis.com".to_string(),
            token: SecretString::default(),
            site_id: None,
            page_size: 100,
            timeout_seconds: 30,
            max_retries: 3,
        }
    }
}

impl WixConfig {
    /// Client settings derived from this section
    pub fn client_config(&self) -> ClientConfig {
        let defaults = RetryPolicy::default();
        let mut config = ClientConfig::default()
            .with_api_base_url(self.api_base_url.clone())
            .with_timeout(Duration::from_secs(self.timeout_seconds))
            .with_retry_policy(RetryPolicy::new(
                self.max_retries,
                defaults.initial_delay,
                defaults.max_delay,
            ));
        if let Some(site_id) = self.site_id.as_deref().filter(|s| !s.is_empty()) {
            config = config.with_site_id(site_id);
        }
        config
    }
}

impl ServiceConfig {
    /// Load configuration from files and the environment.
    ///
    /// Sources, later ones overriding earlier ones:
    ///  1. `/etc/salon-sync/service.yaml`
    ///  2. `./config/service.yaml`
    ///  3. `explicit_path`, or the file named by `SALON_SYNC_CONFIG_FILE`
    ///  4. environment variables such as `SALON_SYNC__SERVER__PORT=9090`
    ///
    /// Every field has a default, so no sources at all yields a valid
    /// configuration. An explicit file must exist; its format follows the
    /// extension (yaml, json or toml).
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("/etc/salon-sync/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::with_name("config/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            );

        let explicit = explicit_path.map(Path::to_path_buf).or_else(|| {
            std::env::var(CONFIG_FILE_ENV)
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        });
        if let Some(path) = explicit {
            info!(path = %path.display(), "Loading configuration from explicit path");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Check that the configuration is usable.
    ///
    /// Runs at startup; the service refuses to start on failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_body_size == 0 {
            return Err(invalid("server.max_body_size must be greater than zero"));
        }

        for (key, path) in [
            ("webhooks.router_path", &self.webhooks.router_path),
            ("webhooks.strict_path", &self.webhooks.strict_path),
        ] {
            if !path.starts_with('/') {
                return Err(invalid(format!("{} must start with '/': {}", key, path)));
            }
        }
        if self.webhooks.router_path == self.webhooks.strict_path {
            return Err(invalid(
                "webhooks.router_path and webhooks.strict_path must differ",
            ));
        }
        if self.webhooks.signature_header.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "webhooks.signature_header".to_string(),
            });
        }
        if self.webhooks.max_string_length == 0 {
            return Err(invalid(
                "webhooks.max_string_length must be greater than zero",
            ));
        }

        if self.security.enable_ip_rate_limiting && self.security.ip_rate_limit == 0 {
            return Err(invalid(
                "security.ip_rate_limit must be greater than zero when rate limiting is enabled",
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of {}: {}",
                LOG_LEVELS.join(", "),
                self.logging.level
            )));
        }

        if let Some(url) = self.datastore.url.as_deref() {
            parse_http_url("datastore.url", url)?;
            if self.datastore.service_key.is_empty() {
                return Err(ConfigError::Missing {
                    key: "datastore.service_key".to_string(),
                });
            }
        }
        let tables = &self.datastore.tables;
        for (key, name) in [
            ("bookings", &tables.bookings),
            ("contacts", &tables.contacts),
            ("orders", &tables.orders),
            ("loyalty", &tables.loyalty),
            ("products", &tables.products),
            ("webhook_logs", &tables.webhook_logs),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::Missing {
                    key: format!("datastore.tables.{}", key),
                });
            }
        }

        parse_http_url("wix.api_base_url", &self.wix.api_base_url)?;
        if !(1..=wix_client::client::MAX_PAGE_SIZE).contains(&self.wix.page_size) {
            return Err(invalid(format!(
                "wix.page_size must be between 1 and {}",
                wix_client::client::MAX_PAGE_SIZE
            )));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

fn parse_http_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| invalid(format!("{} is not a valid URL: {}", key, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!(
            "{} must use http or https, not {}",
            key, other
        ))),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
