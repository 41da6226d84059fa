//! Security response headers.
//!
//! # Responsibilities
//! - Add CSP, nosniff, frame denial, referrer and permissions policies
//! - Add HSTS when the client connection was HTTPS
//!
//! # Design Decisions
//! - HTTPS is detected from `X-Forwarded-Proto`; the guard itself serves
//!   plain HTTP behind a terminating proxy
//! - Headers a handler already set are left alone

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::config::schema::SecurityConfig;

const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

/// Precomputed header values.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    enabled: bool,
    content_security_policy: Option<HeaderValue>,
    hsts: HeaderValue,
}

impl SecurityHeaders {
    pub fn from_config(config: &SecurityConfig) -> Self {
        let content_security_policy = match HeaderValue::from_str(&config.content_security_policy) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(error = %e, "Invalid Content-Security-Policy, header disabled");
                None
            }
        };
        let hsts = HeaderValue::from_str(&format!(
            "max-age={}; includeSubDomains; preload",
            config.hsts_max_age_secs
        ))
        .unwrap_or_else(|_| HeaderValue::from_static("max-age=31536000"));

        Self {
            enabled: config.enable_headers,
            content_security_policy,
            hsts,
        }
    }
}

fn is_https(request: &Request<Body>) -> bool {
    request.uri().scheme_str() == Some("https")
        || request
            .headers()
            .get(X_FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

/// Add security headers to every response.
pub async fn security_headers_middleware(
    State(headers): State<Arc<SecurityHeaders>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !headers.enabled {
        return next.run(request).await;
    }

    let https = is_https(&request);
    let mut response = next.run(request).await;
    let out = response.headers_mut();

    if let Some(csp) = &headers.content_security_policy {
        out.entry(header::CONTENT_SECURITY_POLICY)
            .or_insert_with(|| csp.clone());
    }
    out.entry(header::X_CONTENT_TYPE_OPTIONS)
        .or_insert(HeaderValue::from_static("nosniff"));
    out.entry(header::X_FRAME_OPTIONS)
        .or_insert(HeaderValue::from_static("DENY"));
    out.entry(header::REFERRER_POLICY)
        .or_insert(HeaderValue::from_static("strict-origin-when-cross-origin"));
    out.entry(PERMISSIONS_POLICY).or_insert(HeaderValue::from_static(
        "camera=(), microphone=(), geolocation=(), payment=()",
    ));
    if https {
        out.entry(header::STRICT_TRANSPORT_SECURITY)
            .or_insert_with(|| headers.hsts.clone());
    }

    response
}
