//! Common test utilities for salon-sync-api integration tests
//!
//! This module provides:
//! - A router wired to an in-memory store
//! - Request helpers returning status and parsed body
//! - Shared Wix payload builders

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use salon_sync_api::{build_webhook_processor, create_router, AppState, ServiceConfig, ServiceMetrics};
use salon_sync_core::{webhook::signature::compute_signature, InMemoryStore, SecretString};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const ROUTER_PATH: &str = "/api/webhook-router";
pub const STRICT_PATH: &str = "/api/wix-webhook";

// ============================================================================
// Test Application
// ============================================================================

/// Router plus the store behind it
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub metrics: Arc<ServiceMetrics>,
    pub config: ServiceConfig,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let metrics = ServiceMetrics::new().unwrap();
        let processor = build_webhook_processor(&config, store.clone(), metrics.clone());
        let state = AppState::new(
            config.clone(),
            Arc::new(processor),
            store.clone(),
            metrics.clone(),
        );

        Self {
            router: create_router(state),
            store,
            metrics,
            config,
        }
    }

    /// App that requires signatures made with `secret`
    #[allow(dead_code)]
    pub fn with_secret(secret: &str) -> Self {
        let mut config = ServiceConfig::default();
        config.webhooks.secret = SecretString::new(secret);
        Self::with_config(config)
    }

    /// POST `body` to `path`, optionally naming the event type
    pub async fn post_webhook(
        &self,
        path: &str,
        body: &Value,
        event_type: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(event_type) = event_type {
            request = request.header("x-wix-event-type", event_type);
        }
        self.send(request.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// POST `body` signed with `secret`
    #[allow(dead_code)]
    pub async fn post_signed(
        &self,
        path: &str,
        body: &Value,
        event_type: &str,
        secret: &str,
    ) -> (StatusCode, Value) {
        let body = body.to_string();
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .header("x-wix-event-type", event_type)
            .header("x-wix-signature", compute_signature(secret, body.as_bytes()).unwrap())
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    #[allow(dead_code)]
    pub async fn get(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    /// The single row in `table`, failing the test if there is not exactly one
    #[allow(dead_code)]
    pub fn only_row(&self, table: &str) -> Value {
        let rows = self.store.rows(table);
        assert_eq!(rows.len(), 1, "expected one row in {table}, got {rows:?}");
        Value::Object(rows[0].clone())
    }
}

// ============================================================================
// Payload Builders
// ============================================================================

/// A bare booking entity
#[allow(dead_code)]
pub fn booking(id: &str) -> Value {
    json!({
        "id": id,
        "contactDetails": {
            "contactId": "c-1",
            "firstName": "Ana",
            "lastName": "Lima",
            "email": "ana@example.com"
        },
        "service": { "name": "Haircut", "duration": 45 },
        "startDate": "2024-05-01T10:00:00Z",
        "status": "CONFIRMED",
        "paymentStatus": "NOT_PAID",
        "totalPrice": 30
    })
}

/// Contact-updated delivery for Jane Doe, with no Wix id
#[allow(dead_code)]
pub fn jane_doe() -> Value {
    json!({
        "updatedEvent": {
            "currentEntity": {
                "info": {
                    "name": { "first": "Jane", "last": "Doe" },
                    "emails": { "items": [ { "email": "jane@x.com" } ] }
                }
            }
        }
    })
}
