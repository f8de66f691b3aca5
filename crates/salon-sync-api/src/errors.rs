//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use salon_sync_core::WebhookError;
use tracing::{error, warn};

/// Webhook handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: malformed JSON, or a payload rejected by validation
/// - `401 Unauthorized`: missing or wrong signature
/// - `503 Service Unavailable`: per-IP rate limit, with `Retry-After` so the
///   sender redelivers later
/// - `500 Internal Server Error`: the primary write failed; the body carries
///   the store's message under `details`
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// Webhook processing pipeline failure
    #[error("{0}")]
    ProcessingFailed(#[from] WebhookError),

    /// Unexpected internal server error
    ///
    /// Details are logged but a generic message is returned to the client.
    #[error("Internal server error: {message}")]
    InternalError { message: String },

    /// Too many requests from one client address
    #[error("Rate limit exceeded. Retry after {retry_after_seconds}s")]
    RateLimitExceeded { retry_after_seconds: u64 },
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let (status, message, details, retry_after) = match &self {
            Self::ProcessingFailed(e) => {
                let status = StatusCode::from_u16(e.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                match e {
                    WebhookError::Persistence { table, source } => {
                        error!(
                            table = %table,
                            state = e.terminal_state(),
                            category = ?e.error_category(),
                            transient = e.is_transient(),
                            error = %source,
                            "Primary write failed"
                        );
                        (
                            status,
                            format!("Failed to persist webhook to {}", table),
                            Some(source.to_string()),
                            None,
                        )
                    }
                    _ => {
                        warn!(
                            state = e.terminal_state(),
                            category = ?e.error_category(),
                            error = %e,
                            "Webhook rejected"
                        );
                        (status, e.to_string(), None, None)
                    }
                }
            }
            Self::InternalError { message } => {
                error!(error = %message, "Internal server error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error occurred. Please try again later.".to_string(),
                    None,
                    None,
                )
            }
            Self::RateLimitExceeded {
                retry_after_seconds,
            } => {
                warn!(retry_after = retry_after_seconds, "Rate limit exceeded");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    self.to_string(),
                    None,
                    Some(*retry_after_seconds),
                )
            }
        };

        let mut body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let Some(details) = details {
            body["details"] = serde_json::Value::String(details);
        }

        let mut response = (status, Json(body)).into_response();

        if let Some(retry_seconds) = retry_after {
            if let Ok(header_value) = retry_seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl ServiceError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
