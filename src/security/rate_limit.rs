//! Fixed-window rate limiting and its HTTP middleware.
//!
//! # Responsibilities
//! - Count requests per identifier in epoch-aligned windows
//! - Decide admission and report remaining quota and reset time
//! - Apply named policies to routes, keyed by policy plus user or client IP
//!
//! # Design Decisions
//! - Windows are `floor(now / window_ms)`; a client can spend its quota at the
//!   end of one window and again at the start of the next (up to 2 × max in a
//!   short span). This is accepted and covered by a test
//! - Store failures fail open: the request is admitted and a warning logged
//! - Policies live behind an `ArcSwap` so config reloads apply without restart

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::schema::RateLimitConfig;
use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::security::clock::{Clock, SystemClock};
use crate::security::store::{MemoryStore, RateLimitStore};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
    /// Epoch milliseconds at which the current window's counter expires.
    pub reset_time: u64,
}

/// Bucket key for an identifier at a given instant.
pub fn bucket_key(identifier: &str, now_ms: u64, window_ms: u64) -> String {
    format!("{}:{}", identifier, now_ms / window_ms.max(1))
}

/// Fixed-window limiter over a pluggable counter store.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Limiter over a process-local store and the system clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Count one request for `identifier` and decide whether it is admitted.
    ///
    /// A zero `window_ms` is treated as one millisecond.
    pub async fn check(
        &self,
        identifier: &str,
        max_requests: u64,
        window_ms: u64,
    ) -> RateLimitDecision {
        let window_ms = window_ms.max(1);
        let now = self.clock.now_ms();
        let key = bucket_key(identifier, now, window_ms);

        let decision = match self.store.increment(&key, now, window_ms).await {
            Ok(entry) => RateLimitDecision {
                allowed: entry.count <= max_requests,
                remaining: max_requests.saturating_sub(entry.count),
                reset_time: entry.window_reset_at,
            },
            Err(e) => {
                tracing::warn!(
                    identifier = %identifier,
                    error = %e,
                    "Rate limit store unavailable, admitting request"
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: max_requests,
                    reset_time: now.saturating_add(window_ms),
                }
            }
        };

        match self.store.sweep(now).await {
            Ok(evicted) if evicted > 0 => {
                tracing::trace!(evicted, "Evicted expired rate limit windows");
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Rate limit sweep failed"),
        }
        if let Some(entries) = self.store.len() {
            metrics::record_store_entries(entries);
        }

        decision
    }
}

/// Identity of an authenticated caller, inserted by an upstream auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

/// Middleware state: the shared limiter plus the policy this route applies.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    limiter: Arc<RateLimiter>,
    config: Arc<ArcSwap<RateLimitConfig>>,
    policy: String,
}

impl RateLimitState {
    pub fn new(
        limiter: Arc<RateLimiter>,
        config: Arc<ArcSwap<RateLimitConfig>>,
        policy: impl Into<String>,
    ) -> Self {
        Self {
            limiter,
            config,
            policy: policy.into(),
        }
    }
}

/// Key requests by authenticated user when known, else by client IP.
fn client_identifier(request: &Request<Body>) -> String {
    if let Some(identity) = request.extensions().get::<Identity>() {
        return format!("user:{}", identity.user_id);
    }
    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}

fn quota_headers(limit: u64, decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(decision.reset_time.div_ceil(1000)),
    );
    headers
}

/// Apply the state's named policy to the request.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.load_full();
    if !config.enabled {
        return next.run(request).await;
    }
    let Some(policy) = config.policies.get(&state.policy).cloned() else {
        tracing::error!(policy = %state.policy, "Unknown rate limit policy, request not limited");
        return next.run(request).await;
    };

    let identifier = client_identifier(&request);
    // Policies stacked on one route count independently.
    let counter_key = format!("{}:{}", state.policy, identifier);
    let decision = state
        .limiter
        .check(&counter_key, policy.max_requests, policy.window_ms)
        .await;
    let headers = quota_headers(policy.max_requests, &decision);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(
            security_event = "rate_limit_exceeded",
            client = %identifier,
            policy = %state.policy,
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        metrics::record_rate_limited(&state.policy);

        let now = state.limiter.clock().now_ms();
        let retry_after_secs = decision.reset_time.saturating_sub(now).div_ceil(1000);
        let mut response = ApiError::RateLimited {
            message: policy.message,
            retry_after_secs,
        }
        .into_response();
        response.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from(retry_after_secs),
        );
        response
    };

    // A route policy nested inside a broader one reports its own quota.
    for (name, value) in headers {
        if let Some(name) = name {
            response.headers_mut().entry(name).or_insert(value);
        }
    }
    response
}
