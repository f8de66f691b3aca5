//! # Salon Sync HTTP Service
//!
//! HTTP server receiving Wix webhooks and reconciling them into the salon
//! back end's relational store.
//!
//! Routes:
//! - `POST /api/webhook-router`: best-effort validation
//! - `POST /api/wix-webhook`: strict validation
//! - `GET /health`, `GET /ready`: liveness and datastore readiness
//! - `GET /metrics`: Prometheus text format
//!
//! Both webhook paths are configurable and share one pipeline; only the
//! validation policy differs.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod rate_limit;
pub mod responses;

pub use config::*;
pub use errors::*;
pub use metrics::{MeteredLogSink, ServiceMetrics};
pub use rate_limit::IpRateLimiter;
pub use responses::*;

use axum::{
    extract::{DefaultBodyLimit, MatchedPath, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use salon_sync_core::{
    webhook::Sanitizer, DataStore, HmacSignatureValidator, StoreWebhookLogSink, Timestamp,
    UpsertDispatcher, ValidationPolicy, WebhookHeaders, WebhookLogSink, WebhookProcessor,
    WebhookRequest, WixWebhookProcessor,
};
use std::{collections::HashMap, future::IntoFuture, net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Webhook pipeline
    pub webhook_processor: Arc<dyn WebhookProcessor>,

    /// Datastore, probed by the readiness check
    pub store: Arc<dyn DataStore>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,

    /// Per-IP limiter for the webhook routes, when enabled
    pub rate_limiter: Option<Arc<IpRateLimiter>>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        webhook_processor: Arc<dyn WebhookProcessor>,
        store: Arc<dyn DataStore>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        let rate_limiter = config
            .security
            .enable_ip_rate_limiting
            .then(|| Arc::new(IpRateLimiter::per_minute(config.security.ip_rate_limit)));

        Self {
            config: Arc::new(config),
            webhook_processor,
            store,
            metrics,
            rate_limiter,
        }
    }
}

/// Wire the webhook pipeline from configuration.
///
/// The webhook log goes to the configured log table through a
/// [`MeteredLogSink`]. Signatures are verified only when a secret is set.
pub fn build_webhook_processor(
    config: &ServiceConfig,
    store: Arc<dyn DataStore>,
    metrics: Arc<ServiceMetrics>,
) -> WixWebhookProcessor {
    let tables = config.datastore.tables.clone();

    let mut log_sink = StoreWebhookLogSink::new(store.clone(), tables.webhook_logs.clone());
    if !config.webhooks.log_payloads {
        log_sink = log_sink.without_payloads();
    }
    let log_sink: Arc<dyn WebhookLogSink> =
        Arc::new(MeteredLogSink::new(Arc::new(log_sink), metrics));

    let processor = WixWebhookProcessor::new(UpsertDispatcher::new(store, tables))
        .with_log_sink(log_sink)
        .with_sanitizer(Sanitizer::new(config.webhooks.max_string_length));

    match config.webhooks.signature_secret() {
        Some(secret) => processor
            .with_signature_validator(Arc::new(HmacSignatureValidator::new(secret.clone()))),
        None => {
            warn!("No webhook secret configured; webhooks are accepted without signature checks");
            processor
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhooks = &state.config.webhooks;
    let server = &state.config.server;

    let webhook_routes = Router::new()
        .route(&webhooks.router_path, post(handle_router_webhook))
        .route(&webhooks.strict_path, post(handle_strict_webhook))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/ready", get(handle_readiness_check));

    let observability_routes = Router::new().route("/metrics", get(metrics_endpoint));

    let mut router = Router::new()
        .merge(webhook_routes)
        .merge(health_routes)
        .merge(observability_routes)
        .layer(DefaultBodyLimit::max(server.max_body_size))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ));

    if state.config.security.log_requests {
        router = router.layer(middleware::from_fn(request_logging_middleware));
    }
    router = router.layer(TraceLayer::new_for_http());
    if server.enable_compression {
        router = router.layer(CompressionLayer::new());
    }
    if server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}

/// Start HTTP server
pub async fn start_server(
    config: ServiceConfig,
    webhook_processor: Arc<dyn WebhookProcessor>,
    store: Arc<dyn DataStore>,
    metrics: Arc<ServiceMetrics>,
) -> Result<(), ServiceError> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let state = AppState::new(config, webhook_processor, store, metrics);
    let app = create_router(state);

    let address = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", address);

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown = async move {
        shutdown_signal().await;
        info!(
            timeout_seconds = shutdown_timeout.as_secs(),
            "Shutdown signal received, draining in-flight requests"
        );
        let _ = signalled_tx.send(());
    };

    // In-flight requests finish before the server future resolves, bounded
    // by the shutdown timeout
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .into_future();
    tokio::pin!(server);

    let drain_deadline = async move {
        if signalled_rx.await.is_ok() {
            tokio::time::sleep(shutdown_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = &mut server => {
            result.map_err(|e| ServiceError::ServerFailed {
                message: e.to_string(),
            })?;
        }
        _ = drain_deadline => {
            warn!("Graceful shutdown timed out; abandoning in-flight requests");
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Handle deliveries on the best-effort endpoint
#[instrument(skip(state, headers, body))]
pub async fn handle_router_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, WebhookHandlerError> {
    process_delivery(&state, "router", ValidationPolicy::BestEffort, &headers, body).await
}

/// Handle deliveries on the strict endpoint
#[instrument(skip(state, headers, body))]
pub async fn handle_strict_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, WebhookHandlerError> {
    process_delivery(&state, "strict", ValidationPolicy::Strict, &headers, body).await
}

async fn process_delivery(
    state: &AppState,
    endpoint: &'static str,
    policy: ValidationPolicy,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, WebhookHandlerError> {
    let start = std::time::Instant::now();

    let header_map: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_lowercase(),
                v.to_str().unwrap_or("").to_string(),
            )
        })
        .collect();
    let webhook_headers =
        WebhookHeaders::from_http_headers(&header_map, &state.config.webhooks.signature_header);

    let result = state
        .webhook_processor
        .process_webhook(WebhookRequest::new(webhook_headers, body), policy)
        .await;
    state
        .metrics
        .record_webhook(endpoint, policy, &result, start.elapsed());

    let outcome = result?;

    info!(
        event_id = %outcome.event_id,
        event_type = %outcome.kind,
        outcome = outcome.dispatch.label(),
        "Webhook acknowledged"
    );

    Ok(Json(WebhookResponse::from(&outcome)))
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Liveness: answers as long as the process serves requests
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Timestamp::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness: the datastore must answer
#[instrument(skip(state))]
async fn handle_readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                timestamp: Timestamp::now(),
                datastore: "ok".to_string(),
            }),
        ),
        Err(e) => {
            warn!(error = %e, "Datastore health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    ready: false,
                    timestamp: Timestamp::now(),
                    datastore: e.to_string(),
                }),
            )
        }
    }
}

// ============================================================================
// Observability Handlers
// ============================================================================

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.encode().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking
///
/// Reuses an inbound `x-correlation-id` or generates one, records it on the
/// span and echoes it on the response.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    info!(method = %method, uri = %uri, "Request started");

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();
    if status.is_server_error() {
        error!(
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

/// Record request count and latency by route template
async fn metrics_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let start = std::time::Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    state.metrics.record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed(),
    );
    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
