//! Per-IP fixed-window rate limiting for the webhook endpoints.
//!
//! State is process-local: counters reset on restart and are not shared
//! between instances.

use crate::{errors::WebhookHandlerError, AppState};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::debug;

/// Most client windows held at once
const MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by client IP
#[derive(Debug)]
pub struct IpRateLimiter {
    limit: u32,
    window: Duration,
    max_clients: usize,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl IpRateLimiter {
    /// Allow `limit` requests per client per minute
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            max_clients: MAX_TRACKED_CLIENTS,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Cap the number of tracked client windows
    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients.max(1);
        self
    }

    /// Count one request from `ip`.
    ///
    /// Returns the time until the window resets when the limit is exceeded.
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), Duration> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if !windows.contains_key(&ip) && windows.len() >= self.max_clients {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);

            if windows.len() >= self.max_clients {
                let oldest = windows
                    .iter()
                    .min_by_key(|(_, w)| w.started)
                    .map(|(oldest, _)| *oldest);
                if let Some(oldest) = oldest {
                    windows.remove(&oldest);
                }
            }
        }

        let entry = windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.limit {
            let elapsed = now.duration_since(entry.started);
            return Err(self.window.saturating_sub(elapsed));
        }
        entry.count += 1;
        Ok(())
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().map(|w| w.len()).unwrap_or(0)
    }
}

/// Client address used as the rate limit key.
///
/// The first `x-forwarded-for` hop is only used when `trust_forwarded_for`
/// is set; otherwise, or when the header does not parse, the socket peer.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> Option<IpAddr> {
    let forwarded = trust_forwarded_for
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());

    forwarded.or_else(|| peer.map(|addr| addr.ip()))
}

/// Reject requests over the per-IP limit with 503 and `Retry-After`.
///
/// Requests whose client address cannot be determined are let through.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return next.run(request).await;
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let trust_forwarded_for = state.config.security.trust_forwarded_for;
    let Some(ip) = client_ip(request.headers(), peer, trust_forwarded_for) else {
        debug!("No client address available, skipping rate limit");
        return next.run(request).await;
    };

    match limiter.check(ip) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            state.metrics.rate_limited_total.inc();
            WebhookHandlerError::RateLimitExceeded {
                // Round up so clients never retry inside the current window
                retry_after_seconds: retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0),
            }
            .into_response()
        }
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
