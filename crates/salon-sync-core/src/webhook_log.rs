//! # Webhook Log Sink
//!
//! Append-only audit trail of inbound deliveries. Writes are best-effort:
//! the processor logs a failure and carries on.

use crate::store::{DataStore, Record, StoreError};
use crate::Timestamp;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// One audit log row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookLogEntry {
    /// Canonical event name, e.g. `booking.created`
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub received_at: Timestamp,
    /// Sanitized request body
    pub payload: Value,
}

impl WebhookLogEntry {
    /// Convert to a `webhook_logs` row, optionally without the payload
    pub fn to_record(&self, include_payload: bool) -> Record {
        let mut record = Record::new();
        record.insert("event_type".into(), Value::String(self.event_type.clone()));
        record.insert("entity_type".into(), Value::String(self.entity_type.clone()));
        record.insert(
            "entity_id".into(),
            self.entity_id.clone().map(Value::String).unwrap_or(Value::Null),
        );
        record.insert(
            "received_at".into(),
            Value::String(self.received_at.to_rfc3339()),
        );
        if include_payload {
            record.insert("payload".into(), self.payload.clone());
        }
        record
    }
}

/// Destination for audit log entries
#[async_trait]
pub trait WebhookLogSink: Send + Sync {
    async fn record(&self, entry: &WebhookLogEntry) -> Result<(), LogSinkError>;
}

/// Error type for audit log writes
#[derive(Debug, thiserror::Error)]
pub enum LogSinkError {
    #[error("Failed to write webhook log: {0}")]
    Store(#[from] StoreError),
}

/// Writes entries into a table through the data store
#[derive(Clone)]
pub struct StoreWebhookLogSink {
    store: Arc<dyn DataStore>,
    table: String,
    include_payload: bool,
}

impl StoreWebhookLogSink {
    pub fn new(store: Arc<dyn DataStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            include_payload: true,
        }
    }

    /// Drop payload bodies from log rows
    pub fn without_payloads(mut self) -> Self {
        self.include_payload = false;
        self
    }
}

#[async_trait]
impl WebhookLogSink for StoreWebhookLogSink {
    async fn record(&self, entry: &WebhookLogEntry) -> Result<(), LogSinkError> {
        self.store
            .insert(&self.table, entry.to_record(self.include_payload))
            .await?;
        debug!(table = %self.table, event_type = %entry.event_type, "Webhook logged");
        Ok(())
    }
}

#[cfg(test)]
#[path = "webhook_log_tests.rs"]
mod tests;
