//! Envelope extraction for Wix webhook bodies.
//!
//! Wix has delivered the same entity in five different wrappers over the
//! life of its webhook API. Everything downstream of this module sees only
//! the unwrapped entity.

use crate::EventAction;
use serde::Serialize;
use serde_json::Value;

/// Wrapper in which a Wix entity arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeShape {
    /// `{ actionEvent: { body } }`
    ActionEvent,
    /// `{ createdEvent: { entity } }`
    CreatedEvent,
    /// `{ updatedEvent: { currentEntity } }`
    UpdatedEvent,
    /// `{ deletedEvent: { entity } }`
    DeletedEvent,
    /// The body is the entity
    Raw,
}

impl EnvelopeShape {
    /// Action implied by the wrapper itself, if any
    pub fn implied_action(&self) -> Option<EventAction> {
        match self {
            Self::CreatedEvent => Some(EventAction::Created),
            Self::UpdatedEvent => Some(EventAction::Updated),
            Self::DeletedEvent => Some(EventAction::Deleted),
            Self::ActionEvent | Self::Raw => None,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActionEvent => "action_event",
            Self::CreatedEvent => "created_event",
            Self::UpdatedEvent => "updated_event",
            Self::DeletedEvent => "deleted_event",
            Self::Raw => "raw",
        }
    }
}

/// Wrapper keys in precedence order: (shape, outer key, inner key)
const ENVELOPE_PATHS: [(EnvelopeShape, &str, &str); 4] = [
    (EnvelopeShape::ActionEvent, "actionEvent", "body"),
    (EnvelopeShape::CreatedEvent, "createdEvent", "entity"),
    (EnvelopeShape::UpdatedEvent, "updatedEvent", "currentEntity"),
    (EnvelopeShape::DeletedEvent, "deletedEvent", "entity"),
];

/// An entity lifted out of its envelope
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub shape: EnvelopeShape,
    pub entity: Value,
}

impl ExtractedEntity {
    /// Fill in `id` from the envelope when the entity does not carry one.
    ///
    /// Deleted-event deliveries routinely omit the entity body's `id` and
    /// only name the entity in the envelope's `entityId`.
    pub fn with_fallback_id(mut self, entity_id: Option<&str>) -> Self {
        if let (Some(id), Value::Object(map)) = (entity_id, &mut self.entity) {
            let missing = map.get("id").map(Value::is_null).unwrap_or(true);
            if missing && !id.is_empty() {
                map.insert("id".to_string(), Value::String(id.to_string()));
            }
        }
        self
    }
}

/// Extract the entity from a webhook body.
///
/// Candidates are tried in order: `actionEvent.body`,
/// `createdEvent.entity`, `updatedEvent.currentEntity`,
/// `deletedEvent.entity`. The first one that is present, not null and, when
/// it is an object, not empty wins. Anything else falls back to the whole
/// body. This never fails.
///
/// # Examples
///
/// ```rust
/// use salon_sync_core::webhook::envelope::{extract_entity, EnvelopeShape};
/// use serde_json::json;
///
/// let body = json!({ "createdEvent": { "entity": { "id": "b1" } } });
/// let extracted = extract_entity(&body);
/// assert_eq!(extracted.shape, EnvelopeShape::CreatedEvent);
/// assert_eq!(extracted.entity, json!({ "id": "b1" }));
/// ```
pub fn extract_entity(body: &Value) -> ExtractedEntity {
    for (shape, outer, inner) in ENVELOPE_PATHS {
        if let Some(candidate) = body.get(outer).and_then(|wrapper| wrapper.get(inner)) {
            if is_present(candidate) {
                return ExtractedEntity {
                    shape,
                    entity: candidate.clone(),
                };
            }
        }
    }

    ExtractedEntity {
        shape: EnvelopeShape::Raw,
        entity: body.clone(),
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

/// Metadata Wix sends alongside the entity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookEnvelope {
    /// e.g. `wix.bookings.v2.booking`
    pub entity_fqdn: Option<String>,
    /// e.g. `created`, `canceled`, `payment_status_updated`
    pub slug: Option<String>,
    pub entity_id: Option<String>,
    pub event_time: Option<String>,
    /// Body-level `eventType` or `type`
    pub event_type: Option<String>,
    /// First wrapper key present on the body, even when its entity is empty
    pub declared_shape: Option<EnvelopeShape>,
}

impl WebhookEnvelope {
    /// Read envelope metadata from a parsed body.
    ///
    /// Fields with unexpected types are treated as absent; numbers are
    /// accepted wherever an identifier is expected.
    pub fn parse(body: &Value) -> Self {
        let declared_shape = ENVELOPE_PATHS
            .iter()
            .find(|(_, outer, _)| body.get(*outer).map(Value::is_object).unwrap_or(false))
            .map(|(shape, _, _)| *shape);

        Self {
            entity_fqdn: text_field(body, "entityFqdn"),
            slug: text_field(body, "slug"),
            entity_id: text_field(body, "entityId"),
            event_time: text_field(body, "eventTime"),
            event_type: text_field(body, "eventType").or_else(|| text_field(body, "type")),
            declared_shape,
        }
    }
}

fn text_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
