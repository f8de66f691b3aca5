//! Event classification.
//!
//! Works out which kind of entity a delivery carries and what happened to
//! it. Wix names events in several styles (`booking.created`,
//! `wix.bookings.v2.booking_created`, `BookingCanceled`, or an
//! `entityFqdn` + `slug` pair), and some deliveries carry no name at all.

use super::envelope::{ExtractedEntity, WebhookEnvelope};
use crate::{EntityType, EventAction};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

/// Classified event: entity type plus action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventKind {
    pub entity_type: EntityType,
    pub action: EventAction,
}

impl EventKind {
    pub fn new(entity_type: EntityType, action: EventAction) -> Self {
        Self {
            entity_type,
            action,
        }
    }

    /// Canonical dotted name, e.g. `booking.canceled`
    pub fn event_name(&self) -> String {
        format!("{}.{}", self.entity_type, self.action)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

/// Entity type and action recovered from one event name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEventName {
    pub entity_type: Option<EntityType>,
    pub action: Option<EventAction>,
}

fn camel_boundary() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").ok())
        .as_ref()
}

fn tokenize(name: &str) -> Vec<String> {
    let snake = match camel_boundary() {
        Some(re) => re.replace_all(name, "${1}_${2}").into_owned(),
        None => name.to_string(),
    };

    snake
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a free-form Wix event name.
///
/// The entity type is the last token naming a known entity, so that
/// `wix.stores.v1.order_created` is an order rather than a product. A
/// `payment` + `status` token pair always means a payment-status update.
///
/// # Examples
///
/// ```rust
/// use salon_sync_core::webhook::classify::parse_event_name;
/// use salon_sync_core::{EntityType, EventAction};
///
/// let parsed = parse_event_name("wix.bookings.v2.booking_canceled");
/// assert_eq!(parsed.entity_type, Some(EntityType::Booking));
/// assert_eq!(parsed.action, Some(EventAction::Canceled));
/// ```
pub fn parse_event_name(name: &str) -> ParsedEventName {
    let tokens = tokenize(name);

    let entity_type = tokens
        .iter()
        .rev()
        .map(|token| EntityType::from_name(token))
        .find(EntityType::is_known);

    let is_payment_status = tokens
        .windows(2)
        .any(|pair| pair[0] == "payment" && pair[1] == "status");

    let action = if is_payment_status {
        Some(EventAction::PaymentStatusUpdated)
    } else {
        tokens
            .iter()
            .rev()
            .map(|token| EventAction::from_name(token))
            .find(|action| *action != EventAction::Unknown)
    };

    ParsedEventName {
        entity_type,
        action,
    }
}

/// Guess the entity type from the fields an entity carries.
pub fn infer_entity_type(entity: &Value) -> Option<EntityType> {
    let has = |key: &str| entity.get(key).map(|v| !v.is_null()).unwrap_or(false);

    if is_payment_status_wrapper(entity) {
        return Some(EntityType::Order);
    }
    if has("bookedEntity") || has("contactDetails") || has("formInfo") {
        return Some(EntityType::Booking);
    }
    if has("buyerInfo") || has("lineItems") || has("priceSummary") {
        return Some(EntityType::Order);
    }
    if has("points") {
        return Some(EntityType::Loyalty);
    }
    if has("productType") || has("priceData") {
        return Some(EntityType::Product);
    }
    if has("primaryInfo")
        || entity
            .get("info")
            .map(|info| info.get("emails").is_some() || info.get("name").is_some())
            .unwrap_or(false)
    {
        return Some(EntityType::Contact);
    }
    None
}

/// Check for the `{ order, previousPaymentStatus }` payment-status shape.
pub fn is_payment_status_wrapper(entity: &Value) -> bool {
    entity.get("order").map(Value::is_object).unwrap_or(false)
        && (entity.get("previousPaymentStatus").is_some() || entity.get("id").is_none())
}

/// Classify a delivery.
///
/// Sources are consulted in order, independently for the entity type and
/// the action: the `x-wix-event-type` header, the body's
/// `eventType`/`type`, the `entityFqdn`/`slug` pair, the envelope shape
/// and finally the entity's own fields. Whatever is still unknown stays
/// [`EntityType::Unknown`] / [`EventAction::Unknown`].
pub fn classify_event(
    header_hint: Option<&str>,
    envelope: &WebhookEnvelope,
    extracted: &ExtractedEntity,
) -> EventKind {
    let mut entity_type: Option<EntityType> = None;
    let mut action: Option<EventAction> = None;

    let named = [header_hint, envelope.event_type.as_deref()];
    for name in named.into_iter().flatten() {
        let parsed = parse_event_name(name);
        entity_type = entity_type.or(parsed.entity_type);
        action = action.or(parsed.action);
    }

    if let Some(fqdn) = envelope.entity_fqdn.as_deref() {
        entity_type = entity_type.or(parse_event_name(fqdn).entity_type);
    }
    if let Some(slug) = envelope.slug.as_deref() {
        action = action.or(parse_event_name(slug).action);
    }

    action = action
        .or_else(|| extracted.shape.implied_action())
        .or_else(|| envelope.declared_shape.and_then(|shape| shape.implied_action()));

    if is_payment_status_wrapper(&extracted.entity) {
        action = action.or(Some(EventAction::PaymentStatusUpdated));
    }
    entity_type = entity_type.or_else(|| infer_entity_type(&extracted.entity));

    EventKind {
        entity_type: entity_type.unwrap_or_else(|| EntityType::Unknown("unknown".to_string())),
        action: action.unwrap_or(EventAction::Unknown),
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
