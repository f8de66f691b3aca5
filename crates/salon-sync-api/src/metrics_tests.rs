//! Tests for service metrics.

use super::*;
use salon_sync_core::dispatch::SkipReason;
use salon_sync_core::webhook::EventKind;
use salon_sync_core::{EntityType, EventAction, EventId, StoreError, ValidationError};

fn outcome(dispatch: DispatchOutcome, warning: Option<ValidationError>) -> ProcessingOutcome {
    ProcessingOutcome {
        event_id: EventId::new(),
        kind: EventKind::new(EntityType::Booking, EventAction::Created),
        entity_id: Some("b1".to_string()),
        dispatch,
        validation_warning: warning,
    }
}

fn written(customer: CustomerLink) -> DispatchOutcome {
    DispatchOutcome::Written {
        table: "bookings".to_string(),
        conflict_key: "wix_booking_id".to_string(),
        row: Default::default(),
        customer,
    }
}

/// Verify that two instances can coexist without registration conflicts.
#[test]
fn test_instances_are_independent() {
    let first = ServiceMetrics::new().unwrap();
    let second = ServiceMetrics::new().unwrap();

    first.signature_failures_total.inc();

    assert_eq!(first.signature_failures_total.get(), 1);
    assert_eq!(second.signature_failures_total.get(), 0);
}

#[test]
fn test_encode_uses_namespace() {
    let metrics = ServiceMetrics::new().unwrap();
    metrics.record_http_request("POST", "/api/wix-webhook", 200, Duration::from_millis(3));

    let text = metrics.encode().unwrap();

    assert!(text.contains("salon_sync_http_requests_total"));
    assert!(text.contains("path=\"/api/wix-webhook\""));
}

mod webhook_recording {
    use super::*;

    #[test]
    fn test_success_counts_by_entity_and_outcome() {
        let metrics = ServiceMetrics::new().unwrap();

        metrics.record_webhook(
            "strict",
            ValidationPolicy::Strict,
            &Ok(outcome(written(CustomerLink::Linked), None)),
            Duration::from_millis(5),
        );

        let count = metrics
            .webhook_requests_total
            .with_label_values(&["strict", "booking", "written"])
            .get();
        assert_eq!(count, 1);
        assert_eq!(metrics.customer_link_failures_total.get(), 0);
    }

    /// Verify that best-effort warnings and unlinked customers are counted.
    #[test]
    fn test_warnings_and_link_failures() {
        let metrics = ServiceMetrics::new().unwrap();
        let warning = ValidationError::Required {
            field: "email".to_string(),
        };

        metrics.record_webhook(
            "router",
            ValidationPolicy::BestEffort,
            &Ok(outcome(written(CustomerLink::Failed), Some(warning))),
            Duration::from_millis(5),
        );

        assert_eq!(
            metrics
                .validation_failures_total
                .with_label_values(&["best_effort"])
                .get(),
            1
        );
        assert_eq!(metrics.customer_link_failures_total.get(), 1);
    }

    #[test]
    fn test_skipped_outcome_label() {
        let metrics = ServiceMetrics::new().unwrap();
        let skipped = DispatchOutcome::Skipped {
            reason: SkipReason::UnsupportedEntity {
                entity_type: "coupon".to_string(),
            },
        };

        metrics.record_webhook(
            "router",
            ValidationPolicy::BestEffort,
            &Ok(outcome(skipped, None)),
            Duration::from_millis(1),
        );

        assert_eq!(
            metrics
                .webhook_requests_total
                .with_label_values(&["router", "booking", "skipped"])
                .get(),
            1
        );
    }

    /// Verify that each failure kind lands in its own counter.
    #[test]
    fn test_failures_by_kind() {
        let metrics = ServiceMetrics::new().unwrap();

        metrics.record_webhook(
            "strict",
            ValidationPolicy::Strict,
            &Err(WebhookError::BadSignature {
                reason: "mismatch".to_string(),
            }),
            Duration::from_millis(1),
        );
        metrics.record_webhook(
            "strict",
            ValidationPolicy::Strict,
            &Err(WebhookError::Persistence {
                table: "orders".to_string(),
                source: StoreError::Unavailable {
                    message: "down".to_string(),
                },
            }),
            Duration::from_millis(1),
        );

        assert_eq!(metrics.signature_failures_total.get(), 1);
        assert_eq!(
            metrics
                .persistence_failures_total
                .with_label_values(&["orders"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .webhook_requests_total
                .with_label_values(&["strict", "unknown", "PERSIST_FAILED"])
                .get(),
            1
        );
    }
}

mod log_sink_tests {
    use super::*;
    use salon_sync_core::{InMemoryStore, StoreWebhookLogSink, Timestamp};
    use serde_json::json;

    fn entry() -> WebhookLogEntry {
        WebhookLogEntry {
            event_type: "booking.created".to_string(),
            entity_type: "booking".to_string(),
            entity_id: Some("b1".to_string()),
            received_at: Timestamp::now(),
            payload: json!({ "id": "b1" }),
        }
    }

    /// Verify that failed log writes are counted and still reported.
    #[tokio::test]
    async fn test_failures_are_counted() {
        let metrics = ServiceMetrics::new().unwrap();
        let store = InMemoryStore::new();
        store.fail_table("webhook_logs");
        let sink = MeteredLogSink::new(
            Arc::new(StoreWebhookLogSink::new(
                Arc::new(store.clone()),
                "webhook_logs",
            )),
            metrics.clone(),
        );

        assert!(sink.record(&entry()).await.is_err());
        assert_eq!(metrics.log_sink_failures_total.get(), 1);

        store.restore_table("webhook_logs");
        assert!(sink.record(&entry()).await.is_ok());
        assert_eq!(metrics.log_sink_failures_total.get(), 1);
    }
}
