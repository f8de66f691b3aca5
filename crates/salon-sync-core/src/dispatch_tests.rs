//! Tests for routing and the upsert dispatcher

use super::*;
use crate::mapping::map_entity;
use crate::store::MockDataStore;
use mockall::Sequence;
use serde_json::json;

fn mapped(entity_type: EntityType, action: EventAction, entity: Value) -> MappedEntity {
    map_entity(&EventKind::new(entity_type, action), &entity)
        .expect("entity maps")
        .expect("known entity type")
}

fn booking_with_customer() -> MappedEntity {
    mapped(
        EntityType::Booking,
        EventAction::Created,
        json!({
            "id": "b-1",
            "contactDetails": { "contactId": "c-1", "firstName": "Ana", "email": "ana@x.com" }
        }),
    )
}

mod route_tests {
    use super::*;

    /// Verify the table, key and mode for each entity type.
    #[test]
    fn test_routing_table() {
        let tables = TableNames::default();
        let cases = [
            (EntityType::Booking, EventAction::Canceled, "bookings", "wix_booking_id", WriteMode::Upsert),
            (EntityType::Booking, EventAction::Deleted, "bookings", "wix_booking_id", WriteMode::Upsert),
            (EntityType::Contact, EventAction::Updated, "contacts", "wix_contact_id", WriteMode::Upsert),
            (EntityType::Contact, EventAction::Deleted, "contacts", "wix_contact_id", WriteMode::SoftDelete),
            (EntityType::Order, EventAction::PaymentStatusUpdated, "orders", "wix_order_id", WriteMode::Upsert),
            (EntityType::Order, EventAction::Deleted, "orders", "wix_order_id", WriteMode::SoftDelete),
            (EntityType::Loyalty, EventAction::Updated, "loyalty", "contact_id", WriteMode::Upsert),
            (EntityType::Product, EventAction::Deleted, "products", "wix_product_id", WriteMode::SoftDelete),
        ];

        for (entity_type, action, table, key, mode) in cases {
            let kind = EventKind::new(entity_type, action);
            let route = route(&kind, &tables).expect("routable");
            assert_eq!(route.table, table, "{}", kind);
            assert_eq!(route.conflict_key, key, "{}", kind);
            assert_eq!(route.mode, mode, "{}", kind);
        }
    }

    #[test]
    fn test_unknown_entity_has_no_route() {
        let kind = EventKind::new(EntityType::Unknown("coupon".into()), EventAction::Created);
        assert!(route(&kind, &TableNames::default()).is_none());
    }

    #[test]
    fn test_configured_table_names_are_used() {
        let tables = TableNames {
            bookings: "salon_bookings".to_string(),
            ..TableNames::default()
        };
        let kind = EventKind::new(EntityType::Booking, EventAction::Created);
        assert_eq!(route(&kind, &tables).unwrap().table, "salon_bookings");
    }

    /// Verify that blank and null key values fall through to the fallback key.
    #[test]
    fn test_resolve_key_fallback() {
        let kind = EventKind::new(EntityType::Contact, EventAction::Updated);
        let route = route(&kind, &TableNames::default()).unwrap();

        let mut record = Record::new();
        record.insert("wix_contact_id".into(), json!(" "));
        record.insert("email".into(), json!("a@x.com"));
        assert_eq!(route.resolve_key(&record), Some(("email", json!("a@x.com"))));

        record.insert("wix_contact_id".into(), json!("c-1"));
        assert_eq!(route.resolve_key(&record), Some(("wix_contact_id", json!("c-1"))));

        let empty = Record::new();
        assert_eq!(route.resolve_key(&empty), None);
    }
}

mod dispatch_tests {
    use super::*;

    /// Verify that the customer is written first and its id linked.
    #[tokio::test]
    async fn test_customer_written_before_booking() {
        let mut store = MockDataStore::new();
        let mut seq = Sequence::new();

        store
            .expect_upsert()
            .withf(|table: &str, _: &Record, key: &str| table == "contacts" && key == "wix_contact_id")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, record, _| {
                let mut row = record;
                row.insert("id".into(), json!(7));
                Ok(row)
            });
        store
            .expect_upsert()
            .withf(|table: &str, record: &Record, key: &str| {
                table == "bookings"
                    && key == "wix_booking_id"
                    && record.get("customer_id") == Some(&json!(7))
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, record, _| Ok(record));

        let dispatcher = UpsertDispatcher::new(Arc::new(store), TableNames::default());
        let outcome = dispatcher
            .dispatch(&booking_with_customer(), EventAction::Created)
            .await
            .unwrap();

        match outcome {
            DispatchOutcome::Written {
                table,
                conflict_key,
                customer,
                ..
            } => {
                assert_eq!(table, "bookings");
                assert_eq!(conflict_key, "wix_booking_id");
                assert_eq!(customer, CustomerLink::Linked);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    /// Verify that a failed customer upsert does not block the booking.
    #[tokio::test]
    async fn test_customer_failure_is_tolerated() {
        let mut store = MockDataStore::new();

        store
            .expect_upsert()
            .withf(|table: &str, _: &Record, _: &str| table == "contacts")
            .times(1)
            .returning(|_, _, _| {
                Err(StoreError::Unavailable {
                    message: "down".into(),
                })
            });
        store
            .expect_upsert()
            .withf(|table: &str, record: &Record, _: &str| {
                table == "bookings" && !record.contains_key("customer_id")
            })
            .times(1)
            .returning(|_, record, _| Ok(record));

        let dispatcher = UpsertDispatcher::new(Arc::new(store), TableNames::default());
        let outcome = dispatcher
            .dispatch(&booking_with_customer(), EventAction::Created)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            DispatchOutcome::Written {
                customer: CustomerLink::Failed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_primary_failure_is_reported() {
        let mut store = MockDataStore::new();
        store.expect_upsert().returning(|_, _, _| {
            Err(StoreError::Status {
                status: 409,
                message: "conflict".into(),
            })
        });

        let dispatcher = UpsertDispatcher::new(Arc::new(store), TableNames::default());
        let entity = mapped(EntityType::Product, EventAction::Created, json!({ "id": "p-1", "name": "Gel" }));

        let error = dispatcher.dispatch(&entity, EventAction::Created).await.unwrap_err();

        match &error {
            DispatchError::Store { table, .. } => assert_eq!(table, "products"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!error.is_transient());
    }

    /// Verify that a record without a key value is skipped without touching the store.
    #[tokio::test]
    async fn test_missing_key_is_skipped() {
        let store = MockDataStore::new();
        let dispatcher = UpsertDispatcher::new(Arc::new(store), TableNames::default());
        let entity = mapped(EntityType::Order, EventAction::Created, json!({ "status": "APPROVED" }));

        let outcome = dispatcher.dispatch(&entity, EventAction::Created).await.unwrap();

        assert_eq!(
            outcome.skip_reason(),
            Some(&SkipReason::MissingConflictKey {
                table: "orders".to_string(),
                key: "wix_order_id".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_delete_updates_without_upsert() {
        let mut store = MockDataStore::new();
        store.expect_upsert().never();
        store
            .expect_update()
            .withf(|table: &str, column: &str, value: &Value, patch: &Record| {
                table == "orders"
                    && column == "wix_order_id"
                    && *value == json!("o-9")
                    && patch.contains_key(SOFT_DELETE_COLUMN)
            })
            .times(1)
            .returning(|_, _, _, patch| Ok(vec![patch]));

        let dispatcher = UpsertDispatcher::new(Arc::new(store), TableNames::default());
        let entity = mapped(EntityType::Order, EventAction::Deleted, json!({ "id": "o-9" }));

        let outcome = dispatcher.dispatch(&entity, EventAction::Deleted).await.unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Updated {
                table: "orders".to_string(),
                matched: 1
            }
        );
    }
}
