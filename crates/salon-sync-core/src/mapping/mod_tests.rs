//! Tests for the shared mapping types.

use super::*;
use crate::EventAction;
use serde_json::json;

mod patch_tests {
    use super::*;

    #[derive(Debug, Deserialize, Serialize)]
    struct Probe {
        #[serde(default, skip_serializing_if = "Patch::is_missing")]
        notes: Patch<String>,
    }

    /// Verify that absent, null and present fields deserialize to distinct states.
    #[test]
    fn test_tri_state_deserialization() {
        let absent: Probe = serde_json::from_value(json!({})).unwrap();
        let null: Probe = serde_json::from_value(json!({ "notes": null })).unwrap();
        let value: Probe = serde_json::from_value(json!({ "notes": "hi" })).unwrap();

        assert_eq!(absent.notes, Patch::Missing);
        assert_eq!(null.notes, Patch::Null);
        assert_eq!(value.notes, Patch::Value("hi".to_string()));
    }

    /// Verify that only missing fields are dropped on serialization.
    #[test]
    fn test_serialization_omits_missing_only() {
        let absent = serde_json::to_value(Probe { notes: Patch::Missing }).unwrap();
        let null = serde_json::to_value(Probe { notes: Patch::Null }).unwrap();

        assert_eq!(absent, json!({}));
        assert_eq!(null, json!({ "notes": null }));
    }

    #[test]
    fn test_or_falls_through_null_and_missing() {
        let v = Patch::Value(1);
        assert_eq!(Patch::<i32>::Null.or(v.clone()), v);
        assert_eq!(Patch::<i32>::Missing.or(v.clone()), v);
        assert_eq!(Patch::Value(2).or(v), Patch::Value(2));
        assert_eq!(Patch::<i32>::Null.or(Patch::Missing), Patch::Missing);
    }

    #[test]
    fn test_filter_map_drops_to_missing() {
        let parsed = Patch::Value("abc").filter_map(|s| s.parse::<i32>().ok());
        assert_eq!(parsed, Patch::Missing);
        assert_eq!(Patch::<&str>::Null.filter_map(|s| s.parse::<i32>().ok()), Patch::Null);
    }
}

mod shared_shape_tests {
    use super::*;

    #[test]
    fn test_price_value_shapes() {
        let cases = [
            (json!(12.5), Some(12.5)),
            (json!("12.50"), Some(12.5)),
            (json!({ "amount": "12.5", "currency": "EUR" }), Some(12.5)),
            (json!({ "amount": 12.5 }), Some(12.5)),
            (json!("twelve"), None),
            (json!({}), None),
        ];

        for (input, expected) in cases {
            let price: PriceValue = serde_json::from_value(input.clone()).unwrap();
            assert_eq!(price.to_f64(), expected, "{}", input);
        }
    }

    #[test]
    fn test_join_name() {
        assert_eq!(join_name(Some(" Jane "), Some("Doe ")), Some("Jane Doe".to_string()));
        assert_eq!(join_name(None, Some("Doe")), Some("Doe".to_string()));
        assert_eq!(join_name(Some("  "), None), None);
    }
}

mod map_entity_tests {
    use super::*;

    /// Verify that each known type routes to its mapper.
    #[test]
    fn test_dispatches_by_entity_type() {
        let cases = [
            (EntityType::Booking, json!({ "id": "b" })),
            (EntityType::Contact, json!({ "id": "c" })),
            (EntityType::Order, json!({ "id": "o" })),
            (EntityType::Loyalty, json!({ "id": "l", "contactId": "c" })),
            (EntityType::Product, json!({ "id": "p", "name": "n" })),
        ];

        for (entity_type, entity) in cases {
            let kind = EventKind::new(entity_type.clone(), EventAction::Created);
            let mapped = map_entity(&kind, &entity).unwrap().expect("known type maps");
            assert_eq!(mapped.entity_type(), entity_type);
            assert!(mapped.to_record().unwrap().contains_key("updated_at"));
        }
    }

    #[test]
    fn test_unknown_type_maps_to_none() {
        let kind = EventKind::new(EntityType::Unknown("coupon".into()), EventAction::Created);
        assert!(map_entity(&kind, &json!({ "id": "x" })).unwrap().is_none());
    }

    #[test]
    fn test_customer_only_for_bookings_and_orders() {
        let kind = EventKind::new(EntityType::Booking, EventAction::Created);
        let booking = map_entity(
            &kind,
            &json!({ "id": "b", "contactDetails": { "email": "a@x.com" } }),
        )
        .unwrap()
        .unwrap();
        assert!(booking.customer().is_some());

        let kind = EventKind::new(EntityType::Contact, EventAction::Created);
        let contact = map_entity(&kind, &json!({ "id": "c", "email": "a@x.com" }))
            .unwrap()
            .unwrap();
        assert!(contact.customer().is_none());
    }
}
