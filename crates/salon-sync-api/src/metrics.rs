//! Metrics collection for the API service.
//!
//! Every metric lives in a registry owned by [`ServiceMetrics`], so several
//! instances (one per test, say) never collide on registration.

use async_trait::async_trait;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use salon_sync_core::dispatch::CustomerLink;
use salon_sync_core::{
    DispatchOutcome, LogSinkError, ProcessingOutcome, ValidationPolicy, WebhookError,
    WebhookLogEntry, WebhookLogSink,
};
use std::sync::Arc;
use std::time::Duration;

/// Prefix applied to every metric name
pub const METRICS_NAMESPACE: &str = "salon_sync";

/// Service metrics for observability
#[derive(Debug)]
pub struct ServiceMetrics {
    registry: Registry,

    // HTTP request metrics
    pub http_requests_total: IntCounterVec,
    pub http_request_duration: HistogramVec,

    // Webhook processing metrics
    pub webhook_requests_total: IntCounterVec,
    pub webhook_duration_seconds: HistogramVec,

    // Failure metrics
    pub signature_failures_total: IntCounter,
    pub validation_failures_total: IntCounterVec,
    pub persistence_failures_total: IntCounterVec,
    pub log_sink_failures_total: IntCounter,
    pub customer_link_failures_total: IntCounter,
    pub rate_limited_total: IntCounter,
}

fn policy_label(policy: ValidationPolicy) -> &'static str {
    match policy {
        ValidationPolicy::Strict => "strict",
        ValidationPolicy::BestEffort => "best_effort",
    }
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new_custom(Some(METRICS_NAMESPACE.to_string()), None)?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )?;
        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request processing time",
            )
            .buckets(vec![0.001, 0.01, 0.1, 1.0, 10.0]),
            &["method", "path"],
        )?;

        let webhook_requests_total = IntCounterVec::new(
            Opts::new(
                "webhook_requests_total",
                "Webhook deliveries by endpoint, entity type and outcome",
            ),
            &["endpoint", "entity_type", "outcome"],
        )?;
        let webhook_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "webhook_duration_seconds",
                "Webhook processing time distribution",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
            &["endpoint"],
        )?;

        let signature_failures_total = IntCounter::new(
            "signature_failures_total",
            "Deliveries rejected for a missing or wrong signature",
        )?;
        let validation_failures_total = IntCounterVec::new(
            Opts::new(
                "validation_failures_total",
                "Payloads failing required-field validation or mapping",
            ),
            &["policy"],
        )?;
        let persistence_failures_total = IntCounterVec::new(
            Opts::new(
                "persistence_failures_total",
                "Primary entity writes that failed",
            ),
            &["table"],
        )?;
        let log_sink_failures_total = IntCounter::new(
            "log_sink_failures_total",
            "Webhook log writes that failed",
        )?;
        let customer_link_failures_total = IntCounter::new(
            "customer_link_failures_total",
            "Bookings and orders written without their customer link",
        )?;
        let rate_limited_total = IntCounter::new(
            "rate_limited_total",
            "Requests rejected by the per-IP rate limiter",
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(webhook_requests_total.clone()))?;
        registry.register(Box::new(webhook_duration_seconds.clone()))?;
        registry.register(Box::new(signature_failures_total.clone()))?;
        registry.register(Box::new(validation_failures_total.clone()))?;
        registry.register(Box::new(persistence_failures_total.clone()))?;
        registry.register(Box::new(log_sink_failures_total.clone()))?;
        registry.register(Box::new(customer_link_failures_total.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Arc::new(Self {
            registry,
            http_requests_total,
            http_request_duration,
            webhook_requests_total,
            webhook_duration_seconds,
            signature_failures_total,
            validation_failures_total,
            persistence_failures_total,
            log_sink_failures_total,
            customer_link_failures_total,
            rate_limited_total,
        }))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every metric in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration: Duration) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status.as_str()])
            .inc();
        self.http_request_duration
            .with_label_values(&[method, path])
            .observe(duration.as_secs_f64());
    }

    /// Record the result of one webhook delivery
    pub fn record_webhook(
        &self,
        endpoint: &str,
        policy: ValidationPolicy,
        result: &Result<ProcessingOutcome, WebhookError>,
        duration: Duration,
    ) {
        self.webhook_duration_seconds
            .with_label_values(&[endpoint])
            .observe(duration.as_secs_f64());

        match result {
            Ok(outcome) => {
                // Unrecognised type names are caller-controlled; keep them out of labels
                let entity_type = if outcome.kind.entity_type.is_known() {
                    outcome.kind.entity_type.as_str()
                } else {
                    "unknown"
                };
                self.webhook_requests_total
                    .with_label_values(&[endpoint, entity_type, outcome.dispatch.label()])
                    .inc();
                if outcome.validation_warning.is_some() {
                    self.validation_failures_total
                        .with_label_values(&[policy_label(policy)])
                        .inc();
                }
                if let DispatchOutcome::Written {
                    customer: CustomerLink::Failed,
                    ..
                } = &outcome.dispatch
                {
                    self.customer_link_failures_total.inc();
                }
            }
            Err(error) => {
                self.webhook_requests_total
                    .with_label_values(&[endpoint, "unknown", error.terminal_state()])
                    .inc();
                match error {
                    WebhookError::BadSignature { .. } => self.signature_failures_total.inc(),
                    WebhookError::Validation(_) | WebhookError::Mapping(_) => self
                        .validation_failures_total
                        .with_label_values(&[policy_label(policy)])
                        .inc(),
                    WebhookError::Persistence { table, .. } => self
                        .persistence_failures_total
                        .with_label_values(&[table.as_str()])
                        .inc(),
                    WebhookError::MalformedPayload { .. } => {}
                }
            }
        }
    }
}

/// Log sink decorator that counts failed writes
pub struct MeteredLogSink {
    inner: Arc<dyn WebhookLogSink>,
    metrics: Arc<ServiceMetrics>,
}

impl MeteredLogSink {
    pub fn new(inner: Arc<dyn WebhookLogSink>, metrics: Arc<ServiceMetrics>) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl WebhookLogSink for MeteredLogSink {
    async fn record(&self, entry: &WebhookLogEntry) -> Result<(), LogSinkError> {
        let result = self.inner.record(entry).await;
        if result.is_err() {
            self.metrics.log_sink_failures_total.inc();
        }
        result
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
