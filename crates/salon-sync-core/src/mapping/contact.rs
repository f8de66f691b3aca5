//! Contact mapping.

use super::{join_name, non_empty, now_rfc3339, ExternalId, MappingError, Patch};
use crate::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Source shapes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ContactSource {
    id: Option<ExternalId>,
    info: Option<ContactInfo>,
    name: Option<NameValue>,
    display_name: Option<String>,
    emails: Option<EntryList<EmailEntry>>,
    phones: Option<EntryList<PhoneEntry>>,
    addresses: Option<EntryList<Value>>,
    primary_info: Option<PrimaryInfo>,
    email: Patch<String>,
    phone: Patch<String>,
    label_keys: Option<EntryList<Value>>,
    labels: Option<EntryList<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ContactInfo {
    name: Option<NameParts>,
    emails: Option<EntryList<EmailEntry>>,
    phones: Option<EntryList<PhoneEntry>>,
    addresses: Option<EntryList<Value>>,
    label_keys: Option<EntryList<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NameParts {
    first: Option<String>,
    last: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PrimaryInfo {
    email: Option<String>,
    phone: Option<String>,
}

/// Top-level `name`: a full name string or `{first, last}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NameValue {
    Full(String),
    Parts(NameParts),
}

/// Wix lists come either bare or wrapped as `{ items: [...] }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EntryList<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(default = "Vec::new")]
        items: Vec<T>,
    },
}

impl<T> EntryList<T> {
    fn items(&self) -> &[T] {
        match self {
            Self::Bare(items) | Self::Wrapped { items } => items,
        }
    }

    fn first(&self) -> Option<&T> {
        self.items().first()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmailEntry {
    Bare(String),
    Object {
        #[serde(default)]
        email: Option<String>,
    },
}

impl EmailEntry {
    fn email(&self) -> Option<String> {
        match self {
            Self::Bare(email) => non_empty(email),
            Self::Object { email } => email.as_deref().and_then(non_empty),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PhoneEntry {
    Bare(String),
    Object {
        #[serde(default)]
        phone: Option<String>,
        #[serde(default, rename = "e164Phone")]
        e164_phone: Option<String>,
    },
}

impl PhoneEntry {
    fn phone(&self) -> Option<String> {
        match self {
            Self::Bare(phone) => non_empty(phone),
            Self::Object { phone, e164_phone } => phone
                .as_deref()
                .and_then(non_empty)
                .or_else(|| e164_phone.as_deref().and_then(non_empty)),
        }
    }
}

/// Where the contact's name was found, in lookup order
enum NameSource<'a> {
    InfoParts(&'a NameParts),
    TopLevel(&'a NameValue),
    DisplayName(&'a str),
}

impl NameSource<'_> {
    fn parts(&self) -> Option<&NameParts> {
        match self {
            Self::InfoParts(parts) => Some(*parts),
            Self::TopLevel(NameValue::Parts(parts)) => Some(parts),
            _ => None,
        }
    }

    fn full_name(&self) -> Option<String> {
        if let Some(parts) = self.parts() {
            return join_name(parts.first.as_deref(), parts.last.as_deref());
        }
        match self {
            Self::TopLevel(NameValue::Full(name)) => non_empty(name),
            Self::DisplayName(name) => non_empty(name),
            _ => None,
        }
    }
}

impl ContactSource {
    fn name_sources(&self) -> Vec<NameSource<'_>> {
        let mut sources = Vec::with_capacity(3);
        if let Some(parts) = self.info.as_ref().and_then(|i| i.name.as_ref()) {
            sources.push(NameSource::InfoParts(parts));
        }
        if let Some(name) = &self.name {
            sources.push(NameSource::TopLevel(name));
        }
        if let Some(name) = &self.display_name {
            sources.push(NameSource::DisplayName(name));
        }
        sources
    }

    fn email(&self) -> Patch<String> {
        let from_lists = [
            self.info.as_ref().and_then(|i| i.emails.as_ref()),
            self.emails.as_ref(),
        ]
        .into_iter()
        .flatten()
        .find_map(|list| list.first().and_then(EmailEntry::email))
        .or_else(|| {
            self.primary_info
                .as_ref()
                .and_then(|p| p.email.as_deref())
                .and_then(non_empty)
        });

        Patch::from_option(from_lists).or(self.email.clone())
    }

    fn phone(&self) -> Patch<String> {
        let from_lists = [
            self.info.as_ref().and_then(|i| i.phones.as_ref()),
            self.phones.as_ref(),
        ]
        .into_iter()
        .flatten()
        .find_map(|list| list.first().and_then(PhoneEntry::phone))
        .or_else(|| {
            self.primary_info
                .as_ref()
                .and_then(|p| p.phone.as_deref())
                .and_then(non_empty)
        });

        Patch::from_option(from_lists).or(self.phone.clone())
    }

    fn address(&self) -> Patch<Value> {
        let entry = [
            self.info.as_ref().and_then(|i| i.addresses.as_ref()),
            self.addresses.as_ref(),
        ]
        .into_iter()
        .flatten()
        .find_map(EntryList::first);

        // Wix wraps the postal address as `{ tag, address: {...} }`
        Patch::from_option(entry.map(|e| e.get("address").cloned().unwrap_or_else(|| e.clone())))
    }

    fn labels(&self) -> Patch<Value> {
        [
            self.info.as_ref().and_then(|i| i.label_keys.as_ref()),
            self.label_keys.as_ref(),
            self.labels.as_ref(),
        ]
        .into_iter()
        .flatten()
        .next()
        .map_or(Patch::Missing, |list| Patch::Value(Value::Array(list.items().to_vec())))
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Row for the `contacts` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactRow {
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub wix_contact_id: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub name: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub first_name: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub last_name: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub email: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub phone: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub address: Patch<Value>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub labels: Patch<Value>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub raw_payload: Patch<Value>,
    pub updated_at: String,
}

impl ContactRow {
    /// Contact derived from a booking or order's customer details.
    ///
    /// Returns `None` when there is neither a Wix contact id nor an email
    /// to key the row on.
    pub fn customer(
        contact_id: Option<String>,
        name: Option<String>,
        email: Option<String>,
        phone: Option<String>,
    ) -> Option<Self> {
        if contact_id.is_none() && email.is_none() {
            return None;
        }

        Some(Self {
            wix_contact_id: Patch::from_option(contact_id),
            name: Patch::from_option(name),
            first_name: Patch::Missing,
            last_name: Patch::Missing,
            email: Patch::from_option(email),
            phone: Patch::from_option(phone),
            address: Patch::Missing,
            labels: Patch::Missing,
            raw_payload: Patch::Missing,
            updated_at: now_rfc3339(),
        })
    }
}

/// Map a sanitized contact entity.
///
/// # Errors
///
/// Returns [`MappingError::Shape`] when a field has an unexpected JSON type.
pub fn map_contact(entity: &Value) -> Result<ContactRow, MappingError> {
    let source: ContactSource = serde_json::from_value(entity.clone())
        .map_err(|e| MappingError::shape(&EntityType::Contact, e))?;

    let names = source.name_sources();
    let name = names.iter().find_map(NameSource::full_name);
    let parts = names.iter().find_map(NameSource::parts);

    Ok(ContactRow {
        wix_contact_id: Patch::from_option(source.id.as_ref().and_then(ExternalId::to_text)),
        name: Patch::from_option(name),
        first_name: Patch::from_option(
            parts.and_then(|p| p.first.as_deref()).and_then(non_empty),
        ),
        last_name: Patch::from_option(parts.and_then(|p| p.last.as_deref()).and_then(non_empty)),
        email: source.email(),
        phone: source.phone(),
        address: source.address(),
        labels: source.labels(),
        raw_payload: Patch::Value(entity.clone()),
        updated_at: now_rfc3339(),
    })
}

#[cfg(test)]
#[path = "contact_tests.rs"]
mod tests;
