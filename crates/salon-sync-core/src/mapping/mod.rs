//! # Field Mapping Module
//!
//! Flattens sanitized Wix entities into typed rows for the relational store.
//!
//! Each entity module parses the JSON into a typed source struct, resolves
//! every multi-shape concept (customer, price, start time, email, ...)
//! through an explicit variant enum, and produces a row struct. Optional
//! columns are [`Patch`] values, so a field the payload never mentioned is
//! omitted from the written record while an explicit `null` is written as
//! `null`.

use crate::store::Record;
use crate::webhook::classify::EventKind;
use crate::{EntityType, Timestamp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub mod booking;
pub mod contact;
pub mod loyalty;
pub mod order;
pub mod product;

pub use booking::{BookingMapping, BookingRow};
pub use contact::ContactRow;
pub use loyalty::LoyaltyRow;
pub use order::{OrderMapping, OrderRow};
pub use product::ProductRow;

// ============================================================================
// Patch
// ============================================================================

/// A column value that distinguishes "not mentioned" from "explicitly null".
///
/// Deserializes an absent field (with `#[serde(default)]`) as
/// [`Patch::Missing`] and a JSON `null` as [`Patch::Null`]. Row structs skip
/// `Missing` columns with `skip_serializing_if = "Patch::is_missing"`.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Missing,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Self::Missing
    }
}

impl<T> Patch<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Keep a value, otherwise take `fallback` (null and missing both fall through)
    pub fn or(self, fallback: Patch<T>) -> Patch<T> {
        match self {
            Self::Value(v) => Self::Value(v),
            _ => fallback,
        }
    }

    /// Lazy variant of [`Patch::or`]
    pub fn or_else(self, fallback: impl FnOnce() -> Patch<T>) -> Patch<T> {
        match self {
            Self::Value(v) => Self::Value(v),
            _ => fallback(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Self::Missing => Patch::Missing,
            Self::Null => Patch::Null,
            Self::Value(v) => Patch::Value(f(v)),
        }
    }

    /// Map a value, treating a `None` result as missing
    pub fn filter_map<U>(self, f: impl FnOnce(T) -> Option<U>) -> Patch<U> {
        match self {
            Self::Missing => Patch::Missing,
            Self::Null => Patch::Null,
            Self::Value(v) => f(v).map_or(Patch::Missing, Patch::Value),
        }
    }

    pub fn as_ref(&self) -> Patch<&T> {
        match self {
            Self::Missing => Patch::Missing,
            Self::Null => Patch::Null,
            Self::Value(v) => Patch::Value(v),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// `Some` becomes a value, `None` becomes missing
    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::Missing, Self::Value)
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => v.serialize(serializer),
            Self::Missing | Self::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(|value| value.map_or(Patch::Null, Patch::Value))
    }
}

// ============================================================================
// Shared source shapes
// ============================================================================

/// Wix identifiers arrive as strings and occasionally as numbers
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ExternalId {
    Text(String),
    Number(serde_json::Number),
}

impl ExternalId {
    /// Identifier as text, `None` when it is an empty string
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Text(s) if s.trim().is_empty() => None,
            Self::Text(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
        }
    }
}

/// A bare amount: number or numeric string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

/// A price in any of the shapes Wix has used
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PriceValue {
    /// `12.5` or `"12.50"`
    Plain(Amount),
    /// `{ "amount": "12.50", "currency": "EUR" }`
    Money {
        #[serde(default)]
        amount: Option<Amount>,
        #[serde(default)]
        currency: Option<String>,
    },
}

impl PriceValue {
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Plain(amount) => amount.to_f64(),
            Self::Money { amount, .. } => amount.as_ref().and_then(Amount::to_f64),
        }
    }

    pub fn currency(&self) -> Option<&str> {
        match self {
            Self::Money { currency, .. } => currency.as_deref(),
            Self::Plain(_) => None,
        }
    }
}

/// Collapse an optional price into a numeric column value
pub(crate) fn price_column(price: Patch<PriceValue>) -> Patch<f64> {
    price.filter_map(|p| p.to_f64())
}

/// Trim a string, treating the empty result as absent
pub(crate) fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Join first and last name with a single space, `None` when both are blank
pub(crate) fn join_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [first, last]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    non_empty(&parts.join(" "))
}

// ============================================================================
// Errors
// ============================================================================

/// Error type for mapping failures
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("Payload for {entity_type} does not match any known shape: {message}")]
    Shape {
        entity_type: String,
        message: String,
    },

    #[error("Row for {entity_type} did not serialize to an object")]
    NotAnObject { entity_type: String },
}

impl MappingError {
    pub(crate) fn shape(entity_type: &EntityType, source: serde_json::Error) -> Self {
        Self::Shape {
            entity_type: entity_type.to_string(),
            message: source.to_string(),
        }
    }

    /// Mapping failures are never transient
    pub fn is_transient(&self) -> bool {
        false
    }
}

/// Serialize a row into a store record
pub(crate) fn to_record<T: Serialize>(
    row: &T,
    entity_type: &EntityType,
) -> Result<Record, MappingError> {
    match serde_json::to_value(row) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(MappingError::NotAnObject {
            entity_type: entity_type.to_string(),
        }),
        Err(e) => Err(MappingError::shape(entity_type, e)),
    }
}

pub(crate) fn now_rfc3339() -> String {
    Timestamp::now().to_rfc3339()
}

// ============================================================================
// Dispatch over entity types
// ============================================================================

/// A fully mapped entity, ready for the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum MappedEntity {
    Booking(BookingMapping),
    Contact(ContactRow),
    Order(OrderMapping),
    Loyalty(LoyaltyRow),
    Product(ProductRow),
}

impl MappedEntity {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Booking(_) => EntityType::Booking,
            Self::Contact(_) => EntityType::Contact,
            Self::Order(_) => EntityType::Order,
            Self::Loyalty(_) => EntityType::Loyalty,
            Self::Product(_) => EntityType::Product,
        }
    }

    /// Customer contact to upsert before the primary row, if any
    pub fn customer(&self) -> Option<&ContactRow> {
        match self {
            Self::Booking(mapping) => mapping.customer.as_ref(),
            Self::Order(mapping) => mapping.customer.as_ref(),
            _ => None,
        }
    }

    /// Serialize the primary row
    pub fn to_record(&self) -> Result<Record, MappingError> {
        let entity_type = self.entity_type();
        match self {
            Self::Booking(mapping) => to_record(&mapping.row, &entity_type),
            Self::Contact(row) => to_record(row, &entity_type),
            Self::Order(mapping) => to_record(&mapping.row, &entity_type),
            Self::Loyalty(row) => to_record(row, &entity_type),
            Self::Product(row) => to_record(row, &entity_type),
        }
    }
}

/// Map a sanitized entity according to its classification.
///
/// Returns `Ok(None)` for entity types that have no mapper.
///
/// # Errors
///
/// Returns [`MappingError::Shape`] when a field has a JSON type that none
/// of the known Wix variants use (for example an object where a name is
/// expected).
pub fn map_entity(kind: &EventKind, entity: &Value) -> Result<Option<MappedEntity>, MappingError> {
    let mapped = match &kind.entity_type {
        EntityType::Booking => MappedEntity::Booking(booking::map_booking(entity, kind.action)?),
        EntityType::Contact => MappedEntity::Contact(contact::map_contact(entity)?),
        EntityType::Order => MappedEntity::Order(order::map_order(entity)?),
        EntityType::Loyalty => MappedEntity::Loyalty(loyalty::map_loyalty(entity)?),
        EntityType::Product => MappedEntity::Product(product::map_product(entity)?),
        EntityType::Unknown(_) => return Ok(None),
    };
    Ok(Some(mapped))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
