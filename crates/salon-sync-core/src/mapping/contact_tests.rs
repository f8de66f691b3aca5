//! Tests for contact mapping.

use super::*;
use serde_json::json;

/// Verify the canonical v4 contact shape with wrapped email items.
#[test]
fn test_info_name_and_wrapped_emails() {
    let entity = json!({
        "id": "c-1",
        "info": {
            "name": { "first": "Jane", "last": "Doe" },
            "emails": { "items": [ { "email": "jane@x.com", "tag": "MAIN" } ] },
            "phones": { "items": [ { "phone": "555-0100" } ] }
        }
    });

    let row = map_contact(&entity).unwrap();
    assert_eq!(row.wix_contact_id, Patch::Value("c-1".to_string()));
    assert_eq!(row.name, Patch::Value("Jane Doe".to_string()));
    assert_eq!(row.first_name, Patch::Value("Jane".to_string()));
    assert_eq!(row.last_name, Patch::Value("Doe".to_string()));
    assert_eq!(row.email, Patch::Value("jane@x.com".to_string()));
    assert_eq!(row.phone, Patch::Value("555-0100".to_string()));
    assert_eq!(row.raw_payload, Patch::Value(entity));
}

/// Verify that a last name alone is trimmed rather than space-prefixed.
#[test]
fn test_partial_name_is_trimmed() {
    let row = map_contact(&json!({ "id": "c", "info": { "name": { "last": "Doe" } } })).unwrap();
    assert_eq!(row.name, Patch::Value("Doe".to_string()));
}

#[test]
fn test_name_fallbacks() {
    let full = map_contact(&json!({ "id": "c", "name": "Ana Lima" })).unwrap();
    assert_eq!(full.name, Patch::Value("Ana Lima".to_string()));

    let display = map_contact(&json!({ "id": "c", "displayName": "Salon Regular" })).unwrap();
    assert_eq!(display.name, Patch::Value("Salon Regular".to_string()));

    let none = map_contact(&json!({ "id": "c" })).unwrap();
    assert_eq!(none.name, Patch::Missing);
}

/// Verify each email location in lookup order.
#[test]
fn test_email_locations() {
    let cases = [
        json!({ "id": "c", "info": { "emails": [ { "email": "a@x.com" } ] } }),
        json!({ "id": "c", "emails": [ { "email": "a@x.com" } ] }),
        json!({ "id": "c", "emails": [ "a@x.com" ] }),
        json!({ "id": "c", "primaryInfo": { "email": "a@x.com" } }),
        json!({ "id": "c", "email": "a@x.com" }),
    ];

    for entity in cases {
        let row = map_contact(&entity).unwrap();
        assert_eq!(row.email, Patch::Value("a@x.com".to_string()), "{}", entity);
    }
}

/// Verify that list emails win over the flat field and an explicit null is kept.
#[test]
fn test_email_precedence_and_null() {
    let row = map_contact(&json!({
        "id": "c",
        "emails": [ { "email": "list@x.com" } ],
        "email": "flat@x.com"
    }))
    .unwrap();
    assert_eq!(row.email, Patch::Value("list@x.com".to_string()));

    let row = map_contact(&json!({ "id": "c", "email": null })).unwrap();
    assert_eq!(row.email, Patch::Null);
}

#[test]
fn test_address_and_labels() {
    let row = map_contact(&json!({
        "id": "c",
        "info": {
            "addresses": { "items": [ { "tag": "HOME", "address": { "city": "Porto" } } ] },
            "labelKeys": { "items": [ "custom.vip" ] }
        }
    }))
    .unwrap();

    assert_eq!(row.address, Patch::Value(json!({ "city": "Porto" })));
    assert_eq!(row.labels, Patch::Value(json!(["custom.vip"])));
}

#[test]
fn test_customer_requires_identity() {
    assert!(ContactRow::customer(None, Some("A".into()), None, None).is_none());

    let row = ContactRow::customer(None, None, Some("a@x.com".into()), None).unwrap();
    assert_eq!(row.email, Patch::Value("a@x.com".to_string()));
    assert_eq!(row.wix_contact_id, Patch::Missing);
    assert_eq!(row.raw_payload, Patch::Missing);
}
