//! # Data Store Module
//!
//! Abstraction over the relational store that receives mapped rows.
//!
//! The store speaks in untyped [`Record`]s keyed by column name. Typed rows
//! are produced by [`crate::mapping`]; this layer only knows tables,
//! conflict keys and filters. Implementations live in [`crate::adapters`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row as a column-name to value map
pub type Record = serde_json::Map<String, Value>;

// ============================================================================
// Trait
// ============================================================================

/// Interface for the relational store.
///
/// Writes are idempotent on the supplied conflict key: an upsert either
/// inserts a new row or merges the supplied columns into the existing one.
/// Columns absent from the record are left untouched.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Insert or merge a row, returning the stored representation
    async fn upsert(
        &self,
        table: &str,
        record: Record,
        conflict_key: &str,
    ) -> Result<Record, StoreError>;

    /// Upsert many rows on the same conflict key, returning the number written
    async fn upsert_batch(
        &self,
        table: &str,
        records: Vec<Record>,
        conflict_key: &str,
    ) -> Result<usize, StoreError> {
        let mut written = 0;
        for record in records {
            self.upsert(table, record, conflict_key).await?;
            written += 1;
        }
        Ok(written)
    }

    /// Merge `patch` into every row where `key_column` equals `key_value`
    async fn update(
        &self,
        table: &str,
        key_column: &str,
        key_value: &Value,
        patch: Record,
    ) -> Result<Vec<Record>, StoreError>;

    /// Append a row without conflict handling
    async fn insert(&self, table: &str, record: Record) -> Result<(), StoreError>;

    /// Check that the store is reachable
    async fn health_check(&self) -> Result<(), StoreError>;
}

// ============================================================================
// Table names
// ============================================================================

/// Destination table names, overridable from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub bookings: String,
    pub contacts: String,
    pub orders: String,
    pub loyalty: String,
    pub products: String,
    pub webhook_logs: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            bookings: "bookings".to_string(),
            contacts: "contacts".to_string(),
            orders: "orders".to_string(),
            loyalty: "loyalty".to_string(),
            products: "products".to_string(),
            webhook_logs: "webhook_logs".to_string(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by store implementations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Store request failed: {message}")]
    Request { message: String },

    #[error("Store returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected store response: {message}")]
    UnexpectedResponse { message: String },

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },
}

impl StoreError {
    /// Connection failures, throttling and server errors may succeed on retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request { .. } | Self::Unavailable { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::UnexpectedResponse { .. } => false,
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
