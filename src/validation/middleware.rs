//! Per-route request validation.
//!
//! # Responsibilities
//! - Extract the configured request part as a JSON value
//! - Sanitize it, then validate it against the route's schema
//! - Reject with every field error, or hand the normalized value onward
//!
//! # Design Decisions
//! - Query and path values arrive as strings; schema conversion turns them
//!   into numbers and booleans where the schema asks for them
//! - The normalized body replaces the original bytes; query and params are
//!   published through the [`Validated`] extension since the URI keeps the
//!   raw form
//! - A panicking rule is contained and reported as a 500

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, Query, RawPathParams, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};

use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::sanitize::middleware::{is_json, parse_json, read_body, with_json_body, SanitizedBody};
use crate::sanitize::{DepthPolicy, Sanitizer, DEFAULT_MAX_DEPTH};
use crate::validation::error::ValidationResult;
use crate::validation::schema::{Schema, ValidateOptions};

const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Which part of the request a schema applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPart {
    Body,
    Query,
    Params,
}

impl RequestPart {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestPart::Body => "body",
            RequestPart::Query => "query",
            RequestPart::Params => "params",
        }
    }
}

/// Normalized query and path values for handlers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validated {
    pub query: Option<Value>,
    pub params: Option<Value>,
}

/// A schema bound to a request part, used as middleware state.
#[derive(Debug, Clone)]
pub struct RequestValidator {
    schema: Arc<Schema>,
    part: RequestPart,
    sanitizer: Sanitizer,
    options: ValidateOptions,
    max_body_bytes: usize,
}

/// Build validator state for `part` of the request.
///
/// Use with [`validation_middleware`]:
/// `middleware::from_fn_with_state(validate_request(schemas::login(), RequestPart::Body), validation_middleware)`.
pub fn validate_request(schema: Schema, part: RequestPart) -> RequestValidator {
    RequestValidator {
        schema: Arc::new(schema),
        part,
        sanitizer: Sanitizer::for_input(DEFAULT_MAX_DEPTH),
        options: ValidateOptions::default(),
        max_body_bytes: DEFAULT_BODY_LIMIT,
    }
}

impl RequestValidator {
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_depth_policy(mut self, policy: DepthPolicy) -> Self {
        self.sanitizer = self.sanitizer.with_depth_policy(policy);
        self
    }

    pub fn with_options(mut self, options: ValidateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn part(&self) -> RequestPart {
        self.part
    }

    /// Run the schema, containing any panic raised by a rule.
    fn run_schema(&self, value: &Value) -> Result<ValidationResult, ApiError> {
        catch_unwind(AssertUnwindSafe(|| {
            self.schema.validate_with(value, &self.options)
        }))
        .map_err(|_| {
            tracing::error!(part = self.part.as_str(), "Validator panicked");
            ApiError::Internal
        })
    }

    /// Sanitize then validate; returns the normalized value.
    fn process(&self, raw: &Value, already_sanitized: bool) -> Result<Value, ApiError> {
        let sanitized = if already_sanitized {
            raw.clone()
        } else {
            self.sanitizer.sanitize(raw).map_err(|_| ApiError::TooDeep {
                max_depth: self.sanitizer.max_depth(),
            })?
        };

        match self.run_schema(&sanitized)? {
            Ok(value) => Ok(value),
            Err(errors) => {
                tracing::warn!(
                    security_event = "validation_failed",
                    part = self.part.as_str(),
                    fields = ?errors.fields(),
                    "Request failed validation"
                );
                metrics::record_validation_failure(self.part.as_str());
                Err(ApiError::Validation(errors))
            }
        }
    }
}

fn strings_to_object<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Value {
    let map: Map<String, Value> = pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    Value::Object(map)
}

async fn validate_part(
    validator: &RequestValidator,
    request: Request<Body>,
) -> Result<Request<Body>, ApiError> {
    match validator.part {
        RequestPart::Body => {
            let already_sanitized = request.extensions().get::<SanitizedBody>().is_some();
            if !is_json(&request) {
                return Err(ApiError::InvalidJson);
            }
            let (parts, bytes) = read_body(request, validator.max_body_bytes).await?;
            let raw = parse_json(&bytes)?;
            let value = validator.process(&raw, already_sanitized)?;
            with_json_body(parts, &value)
        }
        RequestPart::Query => {
            let raw = match Query::<HashMap<String, String>>::try_from_uri(request.uri()) {
                Ok(Query(pairs)) => {
                    strings_to_object(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                }
                Err(_) => Value::Object(Map::new()),
            };
            let value = validator.process(&raw, false)?;
            let mut request = request;
            let mut validated = request.extensions().get::<Validated>().cloned().unwrap_or_default();
            validated.query = Some(value);
            request.extensions_mut().insert(validated);
            Ok(request)
        }
        RequestPart::Params => {
            let (mut parts, body) = request.into_parts();
            let raw = match RawPathParams::from_request_parts(&mut parts, &()).await {
                Ok(params) => strings_to_object(params.iter()),
                Err(_) => Value::Object(Map::new()),
            };
            let value = validator.process(&raw, false)?;
            let mut validated = parts.extensions.get::<Validated>().cloned().unwrap_or_default();
            validated.params = Some(value);
            parts.extensions.insert(validated);
            Ok(Request::from_parts(parts, body))
        }
    }
}

/// Validate the configured request part, rejecting with 400 on failure.
pub async fn validation_middleware(
    State(validator): State<RequestValidator>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match validate_part(&validator, request).await {
        Ok(request) => next.run(request).await,
        Err(rejection) => rejection.into_response(),
    }
}
