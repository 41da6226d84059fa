//! Request body gate applied before validation.
//!
//! # Responsibilities
//! - Enforce the body size limit (413)
//! - Reject malformed JSON (400) and bodies carrying script payloads (400)
//! - Rewrite JSON bodies with their sanitized form
//!
//! # Design Decisions
//! - Sanitized bodies are marked with [`SanitizedBody`] so later stages do not
//!   escape them a second time
//! - Non-JSON bodies are only screened, never rewritten

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::config::SanitizeConfig;
use crate::http::response::ApiError;
use crate::sanitize::patterns::{
    has_suspicious_patterns, query_has_suspicious_patterns, value_has_suspicious_patterns,
};
use crate::sanitize::recursive::Sanitizer;

/// Marker extension: the JSON body has already been sanitized.
#[derive(Debug, Clone, Copy)]
pub struct SanitizedBody;

/// Settings for [`sanitize_body_middleware`].
#[derive(Debug, Clone, Copy)]
pub struct InputGuard {
    pub sanitizer: Sanitizer,
    pub max_body_bytes: usize,
    pub reject_suspicious: bool,
}

impl InputGuard {
    pub fn from_config(config: &SanitizeConfig) -> Self {
        Self {
            sanitizer: Sanitizer::for_input(config.max_depth)
                .with_depth_policy(config.depth_policy),
            max_body_bytes: config.max_body_bytes,
            reject_suspicious: config.reject_suspicious,
        }
    }
}

/// Whether the request declares (or defaults to) a JSON body.
pub(crate) fn is_json(request: &Request<Body>) -> bool {
    match request.headers().get(header::CONTENT_TYPE) {
        None => true,
        Some(value) => value
            .to_str()
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false),
    }
}

/// Buffer the body, enforcing `limit`.
pub(crate) async fn read_body(request: Request<Body>, limit: usize) -> Result<(axum::http::request::Parts, Bytes), ApiError> {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(ApiError::PayloadTooLarge { limit });
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| ApiError::PayloadTooLarge { limit })?;
    Ok((parts, bytes))
}

/// Parse a JSON body. An empty body is an empty object.
pub(crate) fn parse_json(bytes: &[u8]) -> Result<Value, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(bytes).map_err(|_| ApiError::InvalidJson)
}

/// Rebuild a request around a JSON value.
pub(crate) fn with_json_body(
    mut parts: axum::http::request::Parts,
    value: &Value,
) -> Result<Request<Body>, ApiError> {
    let bytes = serde_json::to_vec(value).map_err(|e| {
        tracing::error!(error = %e, "Failed to serialize sanitized body");
        ApiError::Internal
    })?;
    parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    parts
        .headers
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(Request::from_parts(parts, Body::from(bytes)))
}

fn reject_suspicious(parts: &axum::http::request::Parts, source: &'static str) -> ApiError {
    tracing::warn!(
        security_event = "suspicious_input_detected",
        method = %parts.method,
        path = %parts.uri.path(),
        source,
        "Rejected request carrying script-like content"
    );
    ApiError::SuspiciousInput
}

async fn guard_body(guard: &InputGuard, request: Request<Body>) -> Result<Request<Body>, ApiError> {
    let json = is_json(&request);
    let (parts, bytes) = read_body(request, guard.max_body_bytes).await?;

    if guard.reject_suspicious
        && parts.uri.query().is_some_and(query_has_suspicious_patterns)
    {
        return Err(reject_suspicious(&parts, "query"));
    }

    if !json || bytes.is_empty() {
        if guard.reject_suspicious && has_suspicious_patterns(&String::from_utf8_lossy(&bytes)) {
            return Err(reject_suspicious(&parts, "body"));
        }
        return Ok(Request::from_parts(parts, Body::from(bytes)));
    }

    let value = parse_json(&bytes)?;
    if guard.reject_suspicious && value_has_suspicious_patterns(&value) {
        return Err(reject_suspicious(&parts, "body"));
    }
    let sanitized = guard.sanitizer.sanitize(&value).map_err(|e| {
        tracing::warn!(
            security_event = "suspicious_input_detected",
            path = %parts.uri.path(),
            error = %e,
            "Rejected over-deep request body"
        );
        ApiError::TooDeep {
            max_depth: guard.sanitizer.max_depth(),
        }
    })?;

    let mut request = with_json_body(parts, &sanitized)?;
    request.extensions_mut().insert(SanitizedBody);
    Ok(request)
}

/// Screen and sanitize the request body.
pub async fn sanitize_body_middleware(
    State(guard): State<InputGuard>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match guard_body(&guard, request).await {
        Ok(request) => next.run(request).await,
        Err(rejection) => rejection.into_response(),
    }
}
