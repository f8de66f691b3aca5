//! # Webhook Processing Module
//!
//! Turns one inbound Wix delivery into one row write.
//!
//! Processing runs through these stages:
//!
//! ```text
//! RECEIVED -> PARSED -> EXTRACTED -> VALIDATED -> MAPPED -> PERSISTED -> RESPONDED
//! ```
//!
//! with the terminal failures `REJECTED_BAD_SIGNATURE`, `REJECTED_BAD_JSON`,
//! `REJECTED_VALIDATION` and `PERSIST_FAILED`. The audit log write runs
//! concurrently with validation, mapping and persistence, and never fails
//! the delivery.

use crate::dispatch::{DispatchError, DispatchOutcome, SkipReason, UpsertDispatcher};
use crate::mapping::{map_entity, MappingError};
use crate::store::StoreError;
use crate::webhook_log::{WebhookLogEntry, WebhookLogSink};
use crate::{ErrorCategory, EventId, Timestamp, ValidationError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn, Span};

pub mod classify;
pub mod envelope;
pub mod sanitize;
pub mod signature;
pub mod validation;

pub use classify::{classify_event, EventKind};
pub use envelope::{extract_entity, EnvelopeShape, ExtractedEntity, WebhookEnvelope};
pub use sanitize::Sanitizer;
pub use signature::HmacSignatureValidator;
pub use validation::validate_entity;

/// Default header carrying the HMAC signature
pub const DEFAULT_SIGNATURE_HEADER: &str = "x-wix-signature";

/// Optional header naming the event type
pub const EVENT_TYPE_HEADER: &str = "x-wix-event-type";

// ============================================================================
// Core Types
// ============================================================================

/// Raw HTTP request data from a Wix webhook
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub event_id: EventId,
    pub headers: WebhookHeaders,
    pub body: Bytes,
    pub received_at: Timestamp,
}

impl WebhookRequest {
    /// Create new webhook request
    pub fn new(headers: WebhookHeaders, body: Bytes) -> Self {
        Self {
            event_id: EventId::new(),
            headers,
            body,
            received_at: Timestamp::now(),
        }
    }

    /// Get signature from headers if present
    pub fn signature(&self) -> Option<&str> {
        self.headers.signature.as_deref()
    }

    /// Get the event type hint from headers if present
    pub fn event_type(&self) -> Option<&str> {
        self.headers.event_type.as_deref()
    }
}

/// Headers relevant to webhook processing
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    pub signature: Option<String>,    // x-wix-signature (configurable)
    pub event_type: Option<String>,   // x-wix-event-type
    pub content_type: Option<String>, // Content-Type
    pub user_agent: Option<String>,   // User-Agent
}

impl WebhookHeaders {
    /// Parse headers from an HTTP header map.
    ///
    /// Header names are matched case-insensitively. Blank values are
    /// treated as absent.
    pub fn from_http_headers(headers: &HashMap<String, String>, signature_header: &str) -> Self {
        let lookup = |name: &str| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            signature: lookup(signature_header),
            event_type: lookup(EVENT_TYPE_HEADER),
            content_type: lookup("content-type"),
            user_agent: lookup("user-agent"),
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }
}

/// Pipeline stages, recorded on the processing span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStage {
    Received,
    Parsed,
    Extracted,
    Validated,
    Mapped,
    Persisted,
    Responded,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Parsed => "PARSED",
            Self::Extracted => "EXTRACTED",
            Self::Validated => "VALIDATED",
            Self::Mapped => "MAPPED",
            Self::Persisted => "PERSISTED",
            Self::Responded => "RESPONDED",
        }
    }

    /// Record the stage on the current span
    pub fn enter(self) {
        Span::current().record("stage", self.as_str());
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How required-field failures are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Reject the delivery with 400
    Strict,
    /// Log a warning and write whatever maps
    BestEffort,
}

/// Result of a successfully handled delivery
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub event_id: EventId,
    pub kind: EventKind,
    pub entity_id: Option<String>,
    pub dispatch: DispatchOutcome,
    /// Validation failure tolerated under [`ValidationPolicy::BestEffort`]
    pub validation_warning: Option<ValidationError>,
}

impl ProcessingOutcome {
    pub fn skip_reason(&self) -> Option<&SkipReason> {
        self.dispatch.skip_reason()
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Terminal failures of webhook processing
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Signature validation failed: {reason}")]
    BadSignature { reason: String },

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("Webhook validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Payload mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("Failed to persist to {table}: {source}")]
    Persistence {
        table: String,
        #[source]
        source: StoreError,
    },
}

impl From<DispatchError> for WebhookError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::Mapping(e) => Self::Mapping(e),
            DispatchError::Store { table, source } => Self::Persistence { table, source },
        }
    }
}

impl WebhookError {
    /// HTTP status code for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadSignature { .. } => 401,
            Self::MalformedPayload { .. } => 400,
            Self::Validation(_) => 400,
            Self::Mapping(_) => 400,
            Self::Persistence { .. } => 500,
        }
    }

    /// Terminal state name
    pub fn terminal_state(&self) -> &'static str {
        match self {
            Self::BadSignature { .. } => "REJECTED_BAD_SIGNATURE",
            Self::MalformedPayload { .. } => "REJECTED_BAD_JSON",
            Self::Validation(_) | Self::Mapping(_) => "REJECTED_VALIDATION",
            Self::Persistence { .. } => "PERSIST_FAILED",
        }
    }

    /// Last stage completed before the failure
    pub fn stage(&self) -> ProcessingStage {
        match self {
            Self::BadSignature { .. } | Self::MalformedPayload { .. } => ProcessingStage::Received,
            Self::Validation(_) => ProcessingStage::Extracted,
            Self::Mapping(_) => ProcessingStage::Validated,
            Self::Persistence { .. } => ProcessingStage::Mapped,
        }
    }

    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Persistence { source, .. } => source.is_transient(),
            Self::BadSignature { .. } => false,
            Self::MalformedPayload { .. } => false,
            Self::Validation(_) => false,
            Self::Mapping(_) => false,
        }
    }

    /// Get error category for monitoring
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::BadSignature { .. } => ErrorCategory::Security,
            Self::Persistence { source, .. } => {
                if source.is_transient() {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Permanent
                }
            }
            Self::MalformedPayload { .. } => ErrorCategory::Permanent,
            Self::Validation(_) => ErrorCategory::Permanent,
            Self::Mapping(_) => ErrorCategory::Permanent,
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Interface for processing one webhook delivery
#[async_trait]
pub trait WebhookProcessor: Send + Sync {
    async fn process_webhook(
        &self,
        request: WebhookRequest,
        policy: ValidationPolicy,
    ) -> Result<ProcessingOutcome, WebhookError>;
}

/// Interface for webhook signature validation
#[async_trait]
pub trait SignatureValidator: Send + Sync {
    /// Validate a signature over the raw request body
    async fn validate_signature(&self, payload: &[u8], signature: &str)
        -> Result<(), ValidationError>;
}

// ============================================================================
// Default Implementation
// ============================================================================

/// Webhook processor for Wix deliveries
///
/// Signature validation and audit logging are optional: without a
/// validator every delivery is accepted unauthenticated, and without a log
/// sink nothing is audited.
#[derive(Clone)]
pub struct WixWebhookProcessor {
    dispatcher: UpsertDispatcher,
    signature_validator: Option<Arc<dyn SignatureValidator>>,
    log_sink: Option<Arc<dyn WebhookLogSink>>,
    sanitizer: Sanitizer,
}

impl WixWebhookProcessor {
    /// Create a processor without signature validation or audit logging
    ///
    /// # Examples
    ///
    /// ```rust
    /// use salon_sync_core::{InMemoryStore, TableNames, UpsertDispatcher, WixWebhookProcessor};
    /// use std::sync::Arc;
    ///
    /// let store = Arc::new(InMemoryStore::new());
    /// let processor = WixWebhookProcessor::new(UpsertDispatcher::new(store, TableNames::default()));
    /// ```
    pub fn new(dispatcher: UpsertDispatcher) -> Self {
        Self {
            dispatcher,
            signature_validator: None,
            log_sink: None,
            sanitizer: Sanitizer::default(),
        }
    }

    pub fn with_signature_validator(mut self, validator: Arc<dyn SignatureValidator>) -> Self {
        self.signature_validator = Some(validator);
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn WebhookLogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn requires_signature(&self) -> bool {
        self.signature_validator.is_some()
    }

    async fn verify_signature(&self, request: &WebhookRequest) -> Result<(), WebhookError> {
        let Some(validator) = &self.signature_validator else {
            debug!("Signature validation skipped - no validator configured");
            return Ok(());
        };

        let signature = request.signature().ok_or_else(|| WebhookError::BadSignature {
            reason: "signature header is missing".to_string(),
        })?;

        validator
            .validate_signature(&request.body, signature)
            .await
            .map_err(|e| WebhookError::BadSignature {
                reason: e.to_string(),
            })
    }

    async fn write_log(&self, entry: &WebhookLogEntry) {
        let Some(sink) = &self.log_sink else {
            return;
        };
        if let Err(e) = sink.record(entry).await {
            warn!(
                event_type = %entry.event_type,
                error = %e,
                "Webhook log write failed"
            );
        }
    }

    async fn persist(
        &self,
        kind: &EventKind,
        entity: &Value,
        policy: ValidationPolicy,
    ) -> Result<(DispatchOutcome, Option<ValidationError>), WebhookError> {
        let warning = match validate_entity(entity, &kind.entity_type) {
            Ok(()) => None,
            Err(e) if policy == ValidationPolicy::Strict => return Err(e.into()),
            Err(e) => {
                warn!(
                    entity_type = %kind.entity_type,
                    field = %e.field(),
                    "Validation failed, continuing best-effort"
                );
                Some(e)
            }
        };
        ProcessingStage::Validated.enter();

        let Some(mapped) = map_entity(kind, entity)? else {
            info!(entity_type = %kind.entity_type, "No mapper for entity type");
            let dispatch = DispatchOutcome::Skipped {
                reason: SkipReason::UnsupportedEntity {
                    entity_type: kind.entity_type.to_string(),
                },
            };
            return Ok((dispatch, warning));
        };
        ProcessingStage::Mapped.enter();

        let dispatch = self.dispatcher.dispatch(&mapped, kind.action).await?;
        ProcessingStage::Persisted.enter();

        Ok((dispatch, warning))
    }
}

/// Parse the raw body; anything but a JSON object is malformed
fn parse_body(body: &[u8]) -> Result<Value, WebhookError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(WebhookError::MalformedPayload {
            message: "webhook body must be a JSON object".to_string(),
        }),
        Err(e) => Err(WebhookError::MalformedPayload {
            message: format!("invalid JSON: {}", e),
        }),
    }
}

/// Entity `id` as text, accepting numeric ids
fn entity_id(entity: &Value) -> Option<String> {
    match entity.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl WebhookProcessor for WixWebhookProcessor {
    #[instrument(
        skip(self, request),
        fields(
            event_id = %request.event_id,
            policy = ?policy,
            stage = tracing::field::Empty,
            event_type = tracing::field::Empty,
            entity_id = tracing::field::Empty,
        )
    )]
    async fn process_webhook(
        &self,
        request: WebhookRequest,
        policy: ValidationPolicy,
    ) -> Result<ProcessingOutcome, WebhookError> {
        ProcessingStage::Received.enter();
        self.verify_signature(&request).await?;

        let body = self.sanitizer.sanitize(parse_body(&request.body)?);
        ProcessingStage::Parsed.enter();

        let envelope = WebhookEnvelope::parse(&body);
        let extracted = extract_entity(&body).with_fallback_id(envelope.entity_id.as_deref());
        let kind = classify_event(request.event_type(), &envelope, &extracted);
        let entity_id = entity_id(&extracted.entity).or_else(|| envelope.entity_id.clone());
        ProcessingStage::Extracted.enter();

        let span = Span::current();
        span.record("event_type", kind.event_name().as_str());
        if let Some(id) = &entity_id {
            span.record("entity_id", id.as_str());
        }
        info!(
            event_type = %kind,
            shape = extracted.shape.as_str(),
            "Processing webhook"
        );

        let entry = WebhookLogEntry {
            event_type: kind.event_name(),
            entity_type: kind.entity_type.to_string(),
            entity_id: entity_id.clone(),
            received_at: request.received_at,
            payload: body,
        };

        let (_, persisted) = tokio::join!(
            self.write_log(&entry),
            self.persist(&kind, &extracted.entity, policy)
        );
        let (dispatch, validation_warning) = persisted?;

        info!(
            event_type = %kind,
            outcome = dispatch.label(),
            table = dispatch.table().unwrap_or("-"),
            "Webhook processed"
        );

        Ok(ProcessingOutcome {
            event_id: request.event_id,
            kind,
            entity_id,
            dispatch,
            validation_warning,
        })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
