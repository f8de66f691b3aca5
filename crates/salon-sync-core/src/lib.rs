//! # Salon-Sync Core
//!
//! Core business logic for the salon-sync Wix webhook intake and
//! reconciliation service.
//!
//! This crate turns Wix webhook deliveries (bookings, contacts, orders,
//! loyalty accounts, products and payment-status changes) into idempotent
//! upserts against a relational store. It also drives the bulk
//! back-fill jobs that walk the Wix query APIs.
//!
//! ## Architecture
//!
//! The core follows clean architecture principles:
//! - Business logic depends only on trait abstractions ([`store::DataStore`],
//!   [`webhook::SignatureValidator`], [`webhook_log::WebhookLogSink`])
//! - Infrastructure implementations live in [`adapters`] and are injected at runtime
//! - Untyped JSON only survives until validation; mapping produces typed rows
//!
//! ## Usage
//!
//! ```rust
//! use salon_sync_core::{EntityType, EventAction, EventId};
//!
//! let event_id = EventId::new();
//! assert_eq!(EntityType::from_name("bookings"), EntityType::Booking);
//! assert_eq!(EventAction::from_name("cancelled"), EventAction::Canceled);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Unique identifier assigned to every inbound webhook delivery
///
/// ULIDs sort by creation time, so log rows order naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Ulid);

impl EventId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UTC instant, rendered as RFC 3339 in rows and responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339())
    }
}

// ============================================================================
// Wix Domain Types
// ============================================================================

/// Kind of Wix entity carried by a webhook or returned by a query API
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Booking,
    Contact,
    Order,
    Loyalty,
    Product,
    /// Anything else; the original name is kept for logging
    Unknown(String),
}

impl EntityType {
    /// Resolve an entity type from a free-form name.
    ///
    /// Accepts singular and plural forms as well as the Wix service names
    /// that appear in fully qualified entity names (`bookings`, `contacts`,
    /// `stores`, `ecom`, `loyalty`).
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "booking" | "bookings" => Self::Booking,
            "contact" | "contacts" | "crm" => Self::Contact,
            "order" | "orders" | "ecom" => Self::Order,
            "loyalty" | "loyalty_account" | "account" | "accounts" => Self::Loyalty,
            "product" | "products" | "stores" => Self::Product,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Booking => "booking",
            Self::Contact => "contact",
            Self::Order => "order",
            Self::Loyalty => "loyalty",
            Self::Product => "product",
            Self::Unknown(name) => name,
        }
    }

    /// Check whether this is a type the mapper knows how to handle
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happened to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Created,
    Updated,
    Deleted,
    Canceled,
    Rescheduled,
    PaymentStatusUpdated,
    Unknown,
}

impl EventAction {
    /// Resolve an action from a free-form name such as `created` or `cancelled`
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "created" | "create" | "added" => Self::Created,
            "updated" | "update" | "changed" | "modified" => Self::Updated,
            "deleted" | "delete" | "removed" => Self::Deleted,
            "canceled" | "cancelled" | "cancel" => Self::Canceled,
            "rescheduled" | "reschedule" => Self::Rescheduled,
            "payment_status_updated" | "paymentstatusupdated" => Self::PaymentStatusUpdated,
            _ => Self::Unknown,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Canceled => "canceled",
            Self::Rescheduled => "rescheduled",
            Self::PaymentStatusUpdated => "payment_status_updated",
            Self::Unknown => "unknown",
        }
    }

    /// Collapse unknown actions to `Updated`, which is how they are written
    pub fn effective(self) -> Self {
        match self {
            Self::Unknown => Self::Updated,
            other => other,
        }
    }

    /// Check whether the action removes the entity on the Wix side
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Deleted | Self::Canceled)
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// A string secret that is wiped from memory on drop and never printed.
///
/// Deserializes transparently from a plain string. Serializes as
/// `<REDACTED>` so that configuration dumps cannot leak it.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get secret as string (only for immediate use)
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Check if secret is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}

impl Serialize for SecretString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_empty() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str("<REDACTED>")
        }
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// How a failed delivery should be treated by alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// May succeed if Wix redelivers
    Transient,
    /// Will fail the same way every time
    Permanent,
    /// Signature mismatch
    Security,
}

/// Payload validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },
}

impl ValidationError {
    /// Name of the offending field
    pub fn field(&self) -> &str {
        match self {
            Self::Required { field } | Self::InvalidFormat { field, .. } => field,
        }
    }
}

// ============================================================================
// Module declarations
// ============================================================================

/// Webhook intake: envelope extraction, classification, sanitization, validation
pub mod webhook;

/// Field mappers from Wix entities to relational rows
pub mod mapping;

/// Relational store abstraction
pub mod store;

/// Routing of mapped rows to tables and conflict keys
pub mod dispatch;

/// Best-effort audit log of inbound webhooks
pub mod webhook_log;

/// Bulk back-fill from the Wix query APIs
pub mod bulk_sync;

/// Infrastructure implementations of the core traits
pub mod adapters;

// Re-export key types for convenience
pub use adapters::{InMemoryStore, PostgrestConfig, PostgrestStore};
pub use bulk_sync::{BulkSync, SyncError, SyncReport};
pub use dispatch::{DispatchError, DispatchOutcome, Route, SkipReason, UpsertDispatcher, WriteMode};
pub use mapping::{MappedEntity, MappingError, Patch};
pub use store::{DataStore, Record, StoreError, TableNames};
pub use webhook::{
    EventKind, HmacSignatureValidator, ProcessingOutcome, ProcessingStage, SignatureValidator,
    ValidationPolicy, WebhookError, WebhookHeaders, WebhookProcessor, WebhookRequest,
    WixWebhookProcessor,
};
pub use webhook_log::{LogSinkError, StoreWebhookLogSink, WebhookLogEntry, WebhookLogSink};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
