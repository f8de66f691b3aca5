//! Integration tests for webhook processing
//!
//! These tests drive the full router with an in-memory store and check the
//! rows that end up in each table.

mod common;

use axum::http::StatusCode;
use common::{booking, jane_doe, TestApp, ROUTER_PATH, STRICT_PATH};
use serde_json::{json, Value};

/// Row without the columns that differ between otherwise identical writes
fn comparable(mut row: Value) -> Value {
    if let Some(map) = row.as_object_mut() {
        for column in ["id", "customer_id", "updated_at"] {
            map.remove(column);
        }
    }
    row
}

/// Verify that every envelope shape lands the same booking row.
#[tokio::test]
async fn test_envelope_shapes_are_equivalent() {
    let entity = booking("b-shape");
    let deliveries = [
        json!({ "actionEvent": { "body": entity.clone() } }),
        json!({ "createdEvent": { "entity": entity.clone() } }),
        json!({ "updatedEvent": { "currentEntity": entity.clone() } }),
        json!({ "deletedEvent": { "entity": entity.clone() } }),
        entity.clone(),
    ];

    let mut rows = Vec::new();
    for delivery in &deliveries {
        let app = TestApp::new();
        let (status, _) = app
            .post_webhook(ROUTER_PATH, delivery, Some("booking.updated"))
            .await;
        assert_eq!(status, StatusCode::OK);
        rows.push(comparable(app.only_row("bookings")));
    }

    for row in &rows[1..] {
        assert_eq!(row, &rows[0]);
    }
    assert_eq!(rows[0]["wix_booking_id"], json!("b-shape"));
}

/// Verify that replaying a booking updates the existing row in place.
#[tokio::test]
async fn test_booking_replay_is_idempotent() {
    let app = TestApp::new();

    let (status, _) = app
        .post_webhook(STRICT_PATH, &booking("b-1"), Some("booking.created"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let first = app.only_row("bookings");

    let mut paid = booking("b-1");
    paid["status"] = json!("COMPLETED");
    paid["paymentStatus"] = json!("PAID");
    let (status, _) = app
        .post_webhook(STRICT_PATH, &paid, Some("booking.updated"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let second = app.only_row("bookings");
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["wix_booking_id"], json!("b-1"));
    assert_eq!(second["status"], json!("COMPLETED"));
    assert_eq!(second["payment_status"], json!("PAID"));
    assert_eq!(app.store.row_count("contacts"), 1);
}

/// Verify that pollution keys are stripped and long strings truncated.
#[tokio::test]
async fn test_payload_is_sanitized() {
    let app = TestApp::new();
    let mut body = booking("b-2");
    body["__proto__"] = json!({ "admin": true });
    body["constructor"] = json!({ "prototype": { "admin": true } });
    body["notes"] = json!("n".repeat(20_000));

    let (status, _) = app
        .post_webhook(ROUTER_PATH, &body, Some("booking.created"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let row = app.only_row("bookings");
    assert_eq!(row["notes"].as_str().unwrap().len(), 10_000);
    let raw = row["raw_payload"].as_object().unwrap();
    assert!(!raw.contains_key("__proto__"));
    assert!(raw["constructor"].get("prototype").is_none());

    let log = app.only_row("webhook_logs");
    assert!(!log.to_string().contains("__proto__"));
}

#[tokio::test]
async fn test_service_name_fallback() {
    let app = TestApp::new();

    let mut manicure = booking("b-3");
    manicure["service"] = json!({ "name": "Manicure" });
    app.post_webhook(ROUTER_PATH, &manicure, Some("booking.created"))
        .await;

    let mut pedicure = booking("b-4");
    pedicure
        .as_object_mut()
        .unwrap()
        .remove("service");
    pedicure["serviceInfo"] = json!({ "name": "Pedicure" });
    app.post_webhook(ROUTER_PATH, &pedicure, Some("booking.created"))
        .await;

    let rows = app.store.rows("bookings");
    let service_of = |id: &str| {
        rows.iter()
            .find(|row| row["wix_booking_id"] == json!(id))
            .map(|row| row["service_name"].clone())
    };
    assert_eq!(service_of("b-3"), Some(json!("Manicure")));
    assert_eq!(service_of("b-4"), Some(json!("Pedicure")));
}

/// Verify that absent fields never overwrite stored values with null.
#[tokio::test]
async fn test_missing_fields_are_omitted() {
    let app = TestApp::new();

    let mut with_notes = booking("b-5");
    with_notes["notes"] = json!("Prefers the window seat");
    app.post_webhook(ROUTER_PATH, &with_notes, Some("booking.created"))
        .await;

    let without_notes = booking("b-5");
    app.post_webhook(ROUTER_PATH, &without_notes, Some("booking.updated"))
        .await;

    let row = app.only_row("bookings");
    assert_eq!(row["notes"], json!("Prefers the window seat"));
}

#[tokio::test]
async fn test_payment_status_event() {
    let app = TestApp::new();
    let body = json!({
        "order": {
            "id": "o-1",
            "number": "10001",
            "paymentStatus": "PAID",
            "buyerInfo": { "email": "buyer@example.com" }
        },
        "previousPaymentStatus": "NOT_PAID"
    });

    let (status, response) = app
        .post_webhook(ROUTER_PATH, &body, Some("order.payment_status_updated"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["table"], json!("orders"));
    let row = app.only_row("orders");
    assert_eq!(row["wix_order_id"], json!("o-1"));
    assert_eq!(row["payment_status"], json!("PAID"));
    assert_eq!(row["previous_payment_status"], json!("NOT_PAID"));
}

/// Verify the contact-updated scenario end to end.
#[tokio::test]
async fn test_contact_updated_scenario() {
    let app = TestApp::new();

    let (status, response) = app
        .post_webhook(ROUTER_PATH, &jane_doe(), Some("contact.updated"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["table"], json!("contacts"));

    let row = app.only_row("contacts");
    assert_eq!(row["name"], json!("Jane Doe"));
    assert_eq!(row["email"], json!("jane@x.com"));

    // A later delivery for the same address updates the same row
    let (status, _) = app
        .post_webhook(ROUTER_PATH, &jane_doe(), Some("contact.updated"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.row_count("contacts"), 1);
}

/// Verify that the audit log is written even when the entity write fails.
#[tokio::test]
async fn test_log_survives_persistence_failure() {
    let app = TestApp::new();
    app.store.fail_table("bookings");

    let (status, response) = app
        .post_webhook(STRICT_PATH, &booking("b-6"), Some("booking.created"))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response["status"], json!(500));
    assert!(response["details"].is_string());
    assert_eq!(app.store.row_count("webhook_logs"), 1);
}

/// Verify that a failing audit log never blocks the entity write.
#[tokio::test]
async fn test_log_failure_is_not_fatal() {
    let app = TestApp::new();
    app.store.fail_table("webhook_logs");

    let (status, _) = app
        .post_webhook(STRICT_PATH, &booking("b-7"), Some("booking.created"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.row_count("bookings"), 1);
    assert_eq!(app.metrics.log_sink_failures_total.get(), 1);
}
