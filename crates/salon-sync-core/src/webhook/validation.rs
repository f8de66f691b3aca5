//! Required-field validation per entity type.
//!
//! Only the fields needed to address a row are enforced. Nested and
//! optional fields are left to the mappers, which tolerate their absence.

use super::classify::is_payment_status_wrapper;
use crate::{EntityType, ValidationError};
use serde_json::Value;
use tracing::warn;

/// Fields that must be present for each known entity type
pub fn required_fields(entity_type: &EntityType) -> &'static [&'static str] {
    match entity_type {
        EntityType::Booking => &["id"],
        EntityType::Contact => &["id"],
        EntityType::Order => &["id"],
        EntityType::Product => &["id", "name"],
        EntityType::Loyalty => &["id", "contactId"],
        EntityType::Unknown(_) => &[],
    }
}

/// Validate that an extracted entity carries its required fields.
///
/// Payment-status deliveries wrap the order as `{ order, previousPaymentStatus }`;
/// for those the order's own `id` is checked and reported as `order.id`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidFormat`] when the entity is not a JSON
/// object and [`ValidationError::Required`] naming the first missing field.
/// Unknown entity types always pass.
pub fn validate_entity(entity: &Value, entity_type: &EntityType) -> Result<(), ValidationError> {
    if !entity_type.is_known() {
        warn!(
            entity_type = %entity_type,
            "No validation rules for entity type; accepting payload"
        );
        return Ok(());
    }

    if !entity.is_object() {
        return Err(ValidationError::InvalidFormat {
            field: "entity".to_string(),
            message: "expected a JSON object".to_string(),
        });
    }

    let (target, prefix) = if *entity_type == EntityType::Order && is_payment_status_wrapper(entity)
    {
        (&entity["order"], "order.")
    } else {
        (entity, "")
    };

    for field in required_fields(entity_type) {
        let present = match target.get(*field) {
            Some(value) if *field == "id" => is_valid_id(value),
            Some(value) => is_non_empty(value),
            None => false,
        };

        if !present {
            return Err(ValidationError::Required {
                field: format!("{}{}", prefix, field),
            });
        }
    }

    Ok(())
}

/// An identifier must be a non-empty string or a number
fn is_valid_id(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(_) => true,
        _ => false,
    }
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
