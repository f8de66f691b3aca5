//! Order and payment-status mapping.

use super::{
    join_name, non_empty, now_rfc3339, ContactRow, ExternalId, MappingError, Patch, PriceValue,
};
use crate::webhook::classify::is_payment_status_wrapper;
use crate::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status written when an order carries neither `fulfillmentStatus` nor `status`
pub const DEFAULT_ORDER_STATUS: &str = "pending";

// ============================================================================
// Source shapes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OrderSource {
    id: Option<ExternalId>,
    number: Option<ExternalId>,
    buyer_info: Option<BuyerInfo>,
    contact_id: Option<String>,
    fulfillment_status: Patch<String>,
    status: Patch<String>,
    payment_status: Patch<String>,
    price_summary: Option<PriceSummary>,
    total_price: Patch<PriceValue>,
    currency: Patch<String>,
    line_items: Patch<Vec<Value>>,
    items: Patch<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BuyerInfo {
    email: Option<String>,
    contact_id: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PriceSummary {
    total: Patch<PriceValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PaymentStatusWrapper {
    previous_payment_status: Patch<String>,
}

/// The two ways an order reaches the mapper
enum OrderPayload<'a> {
    /// The entity is the order
    Plain(&'a Value),
    /// `{ order: {...}, previousPaymentStatus }`
    PaymentStatus {
        order: &'a Value,
        previous: Patch<String>,
    },
}

impl<'a> OrderPayload<'a> {
    fn from_entity(entity: &'a Value) -> Result<Self, MappingError> {
        if !is_payment_status_wrapper(entity) {
            return Ok(Self::Plain(entity));
        }

        let wrapper: PaymentStatusWrapper = serde_json::from_value(entity.clone())
            .map_err(|e| MappingError::shape(&EntityType::Order, e))?;
        Ok(Self::PaymentStatus {
            order: &entity["order"],
            previous: wrapper.previous_payment_status,
        })
    }

    fn order(&self) -> &'a Value {
        match self {
            Self::Plain(order) => *order,
            Self::PaymentStatus { order, .. } => *order,
        }
    }

    fn previous_payment_status(&self) -> Patch<String> {
        match self {
            Self::Plain(_) => Patch::Missing,
            Self::PaymentStatus { previous, .. } => previous.clone(),
        }
    }
}

impl OrderSource {
    fn contact_id(&self) -> Option<String> {
        self.buyer_info
            .as_ref()
            .and_then(|b| b.contact_id.as_deref())
            .or(self.contact_id.as_deref())
            .and_then(non_empty)
    }

    fn total(&self) -> Option<&PriceValue> {
        let summary_total = self
            .price_summary
            .as_ref()
            .and_then(|s| s.total.as_ref().into_option());
        summary_total
            .filter(|p| p.to_f64().is_some())
            .or_else(|| self.total_price.as_ref().into_option())
    }

    fn status(&self) -> String {
        self.fulfillment_status
            .clone()
            .or(self.status.clone())
            .into_option()
            .unwrap_or_else(|| DEFAULT_ORDER_STATUS.to_string())
    }

    fn items(&self) -> Vec<Value> {
        self.line_items
            .clone()
            .or(self.items.clone())
            .into_option()
            .unwrap_or_default()
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Row for the `orders` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wix_order_id: Option<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub order_number: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub customer_email: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub wix_contact_id: Patch<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub payment_status: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub previous_payment_status: Patch<String>,
    pub total_amount: f64,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub currency: Patch<String>,
    pub items: Vec<Value>,
    pub raw_payload: Value,
    pub updated_at: String,
}

/// An order row plus the buyer contact it references
#[derive(Debug, Clone, PartialEq)]
pub struct OrderMapping {
    pub row: OrderRow,
    pub customer: Option<ContactRow>,
}

/// Map a sanitized order entity, or a payment-status wrapper around one.
///
/// For the wrapper, `previous_payment_status` is filled from the wrapper
/// and every other column comes from the inner order.
///
/// # Errors
///
/// Returns [`MappingError::Shape`] when a field has an unexpected JSON type.
pub fn map_order(entity: &Value) -> Result<OrderMapping, MappingError> {
    let payload = OrderPayload::from_entity(entity)?;
    let source: OrderSource = serde_json::from_value(payload.order().clone())
        .map_err(|e| MappingError::shape(&EntityType::Order, e))?;

    let buyer = source.buyer_info.as_ref();
    let customer_email = buyer.and_then(|b| b.email.as_deref()).and_then(non_empty);
    let contact_id = source.contact_id();

    let total = source.total();
    let currency = source
        .currency
        .clone()
        .or_else(|| Patch::from_option(total.and_then(|p| p.currency()).map(str::to_string)));

    let row = OrderRow {
        wix_order_id: source.id.as_ref().and_then(ExternalId::to_text),
        order_number: Patch::from_option(source.number.as_ref().and_then(ExternalId::to_text)),
        customer_email: Patch::from_option(customer_email.clone()),
        wix_contact_id: Patch::from_option(contact_id.clone()),
        status: source.status(),
        payment_status: source.payment_status.clone(),
        previous_payment_status: payload.previous_payment_status(),
        total_amount: total.and_then(PriceValue::to_f64).unwrap_or(0.0),
        currency,
        items: source.items(),
        raw_payload: entity.clone(),
        updated_at: now_rfc3339(),
    };

    let customer = ContactRow::customer(
        contact_id,
        buyer.and_then(|b| join_name(b.first_name.as_deref(), b.last_name.as_deref())),
        customer_email,
        buyer.and_then(|b| b.phone.as_deref()).and_then(non_empty),
    );

    Ok(OrderMapping { row, customer })
}

#[cfg(test)]
#[path = "order_tests.rs"]
mod tests;
