//! Response types for the API.

use salon_sync_core::{EventId, ProcessingOutcome, SkipReason, Timestamp};
use serde::Serialize;

/// Webhook acknowledgement
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub event_id: EventId,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Why nothing was written, when that is the case
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
}

impl From<&ProcessingOutcome> for WebhookResponse {
    fn from(outcome: &ProcessingOutcome) -> Self {
        Self {
            success: true,
            event_id: outcome.event_id,
            event_type: outcome.kind.event_name(),
            table: outcome.dispatch.table().map(str::to_string),
            skipped: outcome.skip_reason().cloned(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Timestamp,
    pub version: String,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub timestamp: Timestamp,
    /// Datastore probe result, `ok` or the failure message
    pub datastore: String,
}
