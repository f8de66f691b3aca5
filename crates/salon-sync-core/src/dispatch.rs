//! # Upsert Dispatcher
//!
//! Routes mapped rows to a table, a conflict key and a write mode, links
//! customers for bookings and orders, and performs the write.
//!
//! Routing table:
//!
//! | Entity  | Table      | Conflict key                     | Removal          |
//! |---------|------------|----------------------------------|------------------|
//! | booking | `bookings` | `wix_booking_id`                 | status canceled  |
//! | contact | `contacts` | `wix_contact_id`, else `email`   | soft delete      |
//! | order   | `orders`   | `wix_order_id`                   | soft delete      |
//! | loyalty | `loyalty`  | `contact_id`                     | upsert           |
//! | product | `products` | `wix_product_id`                 | soft delete      |

use crate::mapping::{to_record, ContactRow, MappedEntity, MappingError};
use crate::store::{DataStore, Record, StoreError, TableNames};
use crate::webhook::classify::EventKind;
use crate::{EntityType, EventAction, Timestamp};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Column set on soft-deleted rows
pub const SOFT_DELETE_COLUMN: &str = "deleted_at";

/// Column on bookings and orders that links to the `contacts` row
pub const CUSTOMER_LINK_COLUMN: &str = "customer_id";

// ============================================================================
// Routing
// ============================================================================

/// How a routed row is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Insert or merge on the conflict key
    Upsert,
    /// Update existing rows only, stamping [`SOFT_DELETE_COLUMN`]
    SoftDelete,
}

/// Destination of a mapped row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub table: String,
    pub conflict_key: &'static str,
    /// Used when the record carries no value for `conflict_key`
    pub fallback_key: Option<&'static str>,
    pub mode: WriteMode,
}

/// Resolve the destination for an event kind.
///
/// Returns `None` for entity types with no table.
///
/// # Examples
///
/// ```rust
/// use salon_sync_core::dispatch::{route, WriteMode};
/// use salon_sync_core::webhook::classify::EventKind;
/// use salon_sync_core::{EntityType, EventAction, TableNames};
///
/// let kind = EventKind::new(EntityType::Contact, EventAction::Deleted);
/// let route = route(&kind, &TableNames::default()).unwrap();
/// assert_eq!(route.table, "contacts");
/// assert_eq!(route.mode, WriteMode::SoftDelete);
/// ```
pub fn route(kind: &EventKind, tables: &TableNames) -> Option<Route> {
    let deleted = kind.action == EventAction::Deleted;
    let soft_delete_on_removal = if deleted {
        WriteMode::SoftDelete
    } else {
        WriteMode::Upsert
    };

    let route = match &kind.entity_type {
        // Bookings are never removed; the mapper forces the canceled status
        EntityType::Booking => Route {
            table: tables.bookings.clone(),
            conflict_key: "wix_booking_id",
            fallback_key: None,
            mode: WriteMode::Upsert,
        },
        EntityType::Contact => Route {
            table: tables.contacts.clone(),
            conflict_key: "wix_contact_id",
            fallback_key: Some("email"),
            mode: soft_delete_on_removal,
        },
        EntityType::Order => Route {
            table: tables.orders.clone(),
            conflict_key: "wix_order_id",
            fallback_key: None,
            mode: soft_delete_on_removal,
        },
        EntityType::Loyalty => Route {
            table: tables.loyalty.clone(),
            conflict_key: "contact_id",
            fallback_key: None,
            mode: WriteMode::Upsert,
        },
        EntityType::Product => Route {
            table: tables.products.clone(),
            conflict_key: "wix_product_id",
            fallback_key: None,
            mode: soft_delete_on_removal,
        },
        EntityType::Unknown(_) => return None,
    };
    Some(route)
}

impl Route {
    /// Pick the conflict key and its value from a record
    pub fn resolve_key(&self, record: &Record) -> Option<(&'static str, Value)> {
        std::iter::once(self.conflict_key)
            .chain(self.fallback_key)
            .find_map(|key| match record.get(key) {
                Some(Value::Null) | None => None,
                Some(Value::String(s)) if s.trim().is_empty() => None,
                Some(value) => Some((key, value.clone())),
            })
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Why a row was not written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    MissingConflictKey { table: String, key: String },
    UnsupportedEntity { entity_type: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingConflictKey { table, key } => {
                write!(f, "no value for conflict key '{}' on {}", key, table)
            }
            Self::UnsupportedEntity { entity_type } => {
                write!(f, "no table for entity type '{}'", entity_type)
            }
        }
    }
}

/// Result of linking the customer contact before a booking or order write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerLink {
    /// The entity carries no customer
    NotApplicable,
    Linked,
    /// The contact upsert failed or returned no id; the row was written unlinked
    Failed,
}

/// What the dispatcher did
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Written {
        table: String,
        conflict_key: String,
        row: Record,
        customer: CustomerLink,
    },
    Updated {
        table: String,
        matched: usize,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl DispatchOutcome {
    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Self::Skipped { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Written { table, .. } | Self::Updated { table, .. } => Some(table),
            Self::Skipped { .. } => None,
        }
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Written { .. } => "written",
            Self::Updated { .. } => "updated",
            Self::Skipped { .. } => "skipped",
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from the primary write
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to build record: {0}")]
    Mapping(#[from] MappingError),

    #[error("Write to {table} failed: {source}")]
    Store {
        table: String,
        #[source]
        source: StoreError,
    },
}

impl DispatchError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Mapping(_) => false,
            Self::Store { source, .. } => source.is_transient(),
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Writes mapped entities to the store
#[derive(Clone)]
pub struct UpsertDispatcher {
    store: Arc<dyn DataStore>,
    tables: TableNames,
}

impl UpsertDispatcher {
    pub fn new(store: Arc<dyn DataStore>, tables: TableNames) -> Self {
        Self { store, tables }
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    /// Route and write one mapped entity.
    ///
    /// Bookings and orders first upsert their customer into `contacts` and
    /// carry the returned row id as `customer_id`. A failed customer write
    /// is logged and the primary write proceeds without the link.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Store`] only when the primary write fails.
    #[instrument(skip(self, mapped), fields(entity_type = %mapped.entity_type(), action = %action))]
    pub async fn dispatch(
        &self,
        mapped: &MappedEntity,
        action: EventAction,
    ) -> Result<DispatchOutcome, DispatchError> {
        let kind = EventKind::new(mapped.entity_type(), action.effective());
        let Some(route) = route(&kind, &self.tables) else {
            return Ok(DispatchOutcome::Skipped {
                reason: SkipReason::UnsupportedEntity {
                    entity_type: kind.entity_type.to_string(),
                },
            });
        };

        let mut record = mapped.to_record()?;
        let Some((conflict_key, key_value)) = route.resolve_key(&record) else {
            warn!(
                table = %route.table,
                conflict_key = route.conflict_key,
                "Record has no conflict key value, skipping write"
            );
            return Ok(DispatchOutcome::Skipped {
                reason: SkipReason::MissingConflictKey {
                    table: route.table,
                    key: route.conflict_key.to_string(),
                },
            });
        };

        if route.mode == WriteMode::SoftDelete {
            return self.soft_delete(&route.table, conflict_key, &key_value).await;
        }

        let customer = match mapped.customer() {
            Some(contact) => match self.link_customer(contact).await {
                Some(customer_id) => {
                    record.insert(CUSTOMER_LINK_COLUMN.to_string(), customer_id);
                    CustomerLink::Linked
                }
                None => CustomerLink::Failed,
            },
            None => CustomerLink::NotApplicable,
        };

        let row = self
            .store
            .upsert(&route.table, record, conflict_key)
            .await
            .map_err(|source| DispatchError::Store {
                table: route.table.clone(),
                source,
            })?;

        info!(
            table = %route.table,
            conflict_key = conflict_key,
            key = %key_value,
            "Row upserted"
        );

        Ok(DispatchOutcome::Written {
            table: route.table,
            conflict_key: conflict_key.to_string(),
            row,
            customer,
        })
    }

    async fn soft_delete(
        &self,
        table: &str,
        key_column: &str,
        key_value: &Value,
    ) -> Result<DispatchOutcome, DispatchError> {
        let now = Value::String(Timestamp::now().to_rfc3339());
        let mut patch = Record::new();
        patch.insert(SOFT_DELETE_COLUMN.to_string(), now.clone());
        patch.insert("updated_at".to_string(), now);

        let rows = self
            .store
            .update(table, key_column, key_value, patch)
            .await
            .map_err(|source| DispatchError::Store {
                table: table.to_string(),
                source,
            })?;

        info!(
            table = %table,
            conflict_key = key_column,
            key = %key_value,
            matched = rows.len(),
            "Row soft-deleted"
        );

        Ok(DispatchOutcome::Updated {
            table: table.to_string(),
            matched: rows.len(),
        })
    }

    /// Upsert the customer contact and return its row id
    async fn link_customer(&self, contact: &ContactRow) -> Option<Value> {
        let kind = EventKind::new(EntityType::Contact, EventAction::Updated);
        let route = route(&kind, &self.tables)?;

        let record = match to_record(contact, &EntityType::Contact) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Could not serialize customer contact");
                return None;
            }
        };
        let (conflict_key, _) = route.resolve_key(&record)?;

        match self.store.upsert(&route.table, record, conflict_key).await {
            Ok(row) => {
                let id = row.get("id").filter(|id| !id.is_null()).cloned();
                if id.is_none() {
                    debug!(table = %route.table, "Customer row returned without an id");
                }
                id
            }
            Err(e) => {
                warn!(
                    table = %route.table,
                    conflict_key = conflict_key,
                    error = %e,
                    "Customer upsert failed, writing primary row unlinked"
                );
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
