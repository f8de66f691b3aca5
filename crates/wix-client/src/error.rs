//! Error types for Wix API operations.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by the Wix REST API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP error response from the Wix API.
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    /// Rate limit exceeded; `retry_after` comes from the `Retry-After` header.
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: Option<Duration> },

    /// Request to the Wix API timed out.
    #[error("Request timeout")]
    Timeout,

    /// The request was invalid (client error).
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The API token was rejected.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The token lacks permission for the resource.
    #[error("Authorization failed")]
    AuthorizationFailed,

    #[error("Resource not found")]
    NotFound,

    /// Client construction or URL problems.
    #[error("Client configuration error: {message}")]
    Configuration { message: String },

    /// Failed to parse a JSON response.
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// HTTP client error (network, TLS, etc.).
    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),
}

impl ApiError {
    /// Check if this error represents a transient condition that may succeed if retried.
    ///
    /// Transient conditions include server errors (5xx), rate limiting
    /// (429), timeouts and network errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpError { status, .. } => *status >= 500 || *status == 429,
            Self::RateLimitExceeded { .. } => true,
            Self::Timeout => true,
            Self::InvalidRequest { .. } => false,
            Self::AuthenticationFailed => false,
            Self::AuthorizationFailed => false,
            Self::NotFound => false,
            Self::Configuration { .. } => false,
            Self::JsonError(_) => false,
            Self::HttpClientError(_) => true,
        }
    }

    /// Delay requested by the server, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classify an unsuccessful response status.
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 => Self::AuthenticationFailed,
            403 => Self::AuthorizationFailed,
            404 => Self::NotFound,
            429 => Self::RateLimitExceeded { retry_after },
            400 | 422 => Self::InvalidRequest { message },
            _ => Self::HttpError { status, message },
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
