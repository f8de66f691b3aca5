//! Booking mapping.

use super::{
    join_name, non_empty, now_rfc3339, price_column, Amount, ContactRow, ExternalId,
    MappingError, Patch, PriceValue,
};
use crate::{EntityType, EventAction};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status written for canceled and deleted bookings
pub const CANCELED_STATUS: &str = "canceled";

// ============================================================================
// Source shapes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BookingSource {
    id: Option<ExternalId>,
    contact_details: Option<PersonDetails>,
    form_info: Option<PersonDetails>,
    service: Option<ServiceDetails>,
    service_info: Option<ServiceDetails>,
    booked_entity: Option<BookedEntity>,
    start_date: Patch<String>,
    end_date: Patch<String>,
    start: Option<SlotTime>,
    end: Option<SlotTime>,
    status: Patch<String>,
    payment_status: Patch<String>,
    total_price: Patch<PriceValue>,
    payment: Option<PaymentDetails>,
    notes: Patch<String>,
}

/// Customer fields as they appear under `contactDetails` or `formInfo`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PersonDetails {
    contact_id: Option<String>,
    name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceDetails {
    name: Patch<String>,
    duration: Patch<Amount>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BookedEntity {
    title: Option<String>,
    slot: Option<BookedSlot>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BookedSlot {
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlotTime {
    timestamp: Patch<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PaymentDetails {
    final_price: Patch<PriceValue>,
}

/// Where a customer detail was found, in lookup order
enum CustomerSource<'a> {
    ContactDetails(&'a PersonDetails),
    FormInfo(&'a PersonDetails),
}

impl<'a> CustomerSource<'a> {
    fn details(&self) -> &'a PersonDetails {
        match self {
            Self::ContactDetails(details) | Self::FormInfo(details) => *details,
        }
    }

    fn name(&self) -> Option<String> {
        let details = self.details();
        let joined = join_name(details.first_name.as_deref(), details.last_name.as_deref());
        match self {
            Self::ContactDetails(_) => joined,
            Self::FormInfo(_) => details.name.as_deref().and_then(non_empty).or(joined),
        }
    }

    fn email(&self) -> Option<String> {
        self.details().email.as_deref().and_then(non_empty)
    }

    fn phone(&self) -> Option<String> {
        self.details().phone.as_deref().and_then(non_empty)
    }

    fn contact_id(&self) -> Option<String> {
        self.details().contact_id.as_deref().and_then(non_empty)
    }
}

/// Where service details were found, in lookup order
enum ServiceSource<'a> {
    Service(&'a ServiceDetails),
    ServiceInfo(&'a ServiceDetails),
    BookedEntity(&'a BookedEntity),
}

impl ServiceSource<'_> {
    fn name(&self) -> Patch<String> {
        match self {
            Self::Service(details) | Self::ServiceInfo(details) => details.name.clone(),
            Self::BookedEntity(entity) => Patch::from_option(entity.title.clone()),
        }
    }

    fn duration(&self) -> Patch<i64> {
        match self {
            Self::Service(details) | Self::ServiceInfo(details) => details
                .duration
                .clone()
                .filter_map(|d| d.to_f64())
                .map(|d| d.round() as i64),
            Self::BookedEntity(_) => Patch::Missing,
        }
    }
}

impl BookingSource {
    fn customer_sources(&self) -> Vec<CustomerSource<'_>> {
        let mut sources = Vec::with_capacity(2);
        if let Some(details) = &self.contact_details {
            sources.push(CustomerSource::ContactDetails(details));
        }
        if let Some(details) = &self.form_info {
            sources.push(CustomerSource::FormInfo(details));
        }
        sources
    }

    fn service_sources(&self) -> Vec<ServiceSource<'_>> {
        let mut sources = Vec::with_capacity(3);
        if let Some(details) = &self.service {
            sources.push(ServiceSource::Service(details));
        }
        if let Some(details) = &self.service_info {
            sources.push(ServiceSource::ServiceInfo(details));
        }
        if let Some(entity) = &self.booked_entity {
            sources.push(ServiceSource::BookedEntity(entity));
        }
        sources
    }

    fn start_time(&self) -> Patch<String> {
        self.start_date
            .clone()
            .or_else(|| slot_timestamp(&self.start))
            .or_else(|| booked_slot(&self.booked_entity, |slot| slot.start_date.clone()))
    }

    fn end_time(&self) -> Patch<String> {
        self.end_date
            .clone()
            .or_else(|| slot_timestamp(&self.end))
            .or_else(|| booked_slot(&self.booked_entity, |slot| slot.end_date.clone()))
    }

    fn total_price(&self) -> Patch<f64> {
        let final_price = self
            .payment
            .as_ref()
            .map(|p| p.final_price.clone())
            .unwrap_or_default();
        price_column(self.total_price.clone().or(final_price))
    }
}

fn slot_timestamp(slot: &Option<SlotTime>) -> Patch<String> {
    slot.as_ref().map(|s| s.timestamp.clone()).unwrap_or_default()
}

fn booked_slot(
    entity: &Option<BookedEntity>,
    pick: impl FnOnce(&BookedSlot) -> Option<String>,
) -> Patch<String> {
    Patch::from_option(entity.as_ref().and_then(|e| e.slot.as_ref()).and_then(pick))
}

fn first_patch<S>(sources: &[S], pick: impl Fn(&S) -> Patch<String>) -> Patch<String> {
    sources
        .iter()
        .fold(Patch::Missing, |found, source| found.or_else(|| pick(source)))
}

fn first_some<S>(sources: &[S], pick: impl Fn(&S) -> Option<String>) -> Option<String> {
    sources.iter().find_map(pick)
}

// ============================================================================
// Rows
// ============================================================================

/// Row for the `bookings` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wix_booking_id: Option<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub customer_name: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub customer_email: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub customer_phone: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub wix_contact_id: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub service_name: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub service_duration: Patch<i64>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub start_time: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub end_time: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub status: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub payment_status: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub total_price: Patch<f64>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub notes: Patch<String>,
    pub raw_payload: Value,
    pub updated_at: String,
}

/// A booking row plus the customer contact it references
#[derive(Debug, Clone, PartialEq)]
pub struct BookingMapping {
    pub row: BookingRow,
    pub customer: Option<ContactRow>,
}

/// Map a sanitized booking entity.
///
/// Canceled and deleted bookings keep their row; only the status changes.
///
/// # Errors
///
/// Returns [`MappingError::Shape`] when a field has an unexpected JSON type.
pub fn map_booking(entity: &Value, action: EventAction) -> Result<BookingMapping, MappingError> {
    let source: BookingSource = serde_json::from_value(entity.clone())
        .map_err(|e| MappingError::shape(&EntityType::Booking, e))?;

    let customers = source.customer_sources();
    let services = source.service_sources();

    let customer_name = first_some(&customers, CustomerSource::name);
    let customer_email = first_some(&customers, CustomerSource::email);
    let customer_phone = first_some(&customers, CustomerSource::phone);
    let contact_id = first_some(&customers, CustomerSource::contact_id);

    let status = if action.is_removal() {
        Patch::Value(CANCELED_STATUS.to_string())
    } else {
        source.status.clone()
    };

    let service_duration = services
        .iter()
        .fold(Patch::Missing, |found, s| found.or_else(|| s.duration()));

    let row = BookingRow {
        wix_booking_id: source.id.as_ref().and_then(ExternalId::to_text),
        customer_name: Patch::from_option(customer_name.clone()),
        customer_email: Patch::from_option(customer_email.clone()),
        customer_phone: Patch::from_option(customer_phone.clone()),
        wix_contact_id: Patch::from_option(contact_id.clone()),
        service_name: first_patch(&services, ServiceSource::name),
        service_duration,
        start_time: source.start_time(),
        end_time: source.end_time(),
        status,
        payment_status: source.payment_status.clone(),
        total_price: source.total_price(),
        notes: source.notes.clone(),
        raw_payload: entity.clone(),
        updated_at: now_rfc3339(),
    };

    let customer = ContactRow::customer(contact_id, customer_name, customer_email, customer_phone);

    Ok(BookingMapping { row, customer })
}

#[cfg(test)]
#[path = "booking_tests.rs"]
mod tests;
