//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, depth > 0, timeouts > 0)
//! - Check addresses and datastore URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{GuardConfig, StoreKind};
use crate::datastore::DatastoreTarget;

/// A semantic problem with one configuration field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    for (name, policy) in &config.rate_limit.policies {
        if policy.window_ms == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.policies.{name}.window_ms"),
                "must be greater than 0",
            ));
        }
        if policy.max_requests == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.policies.{name}.max_requests"),
                "must be greater than 0",
            ));
        }
    }
    if config.rate_limit.store == StoreKind::Redis {
        if cfg!(not(feature = "redis-store")) {
            errors.push(ValidationError::new(
                "rate_limit.store",
                "redis store requires the `redis-store` feature",
            ));
        }
        if url::Url::parse(&config.rate_limit.redis_url).is_err() {
            errors.push(ValidationError::new("rate_limit.redis_url", "is not a valid URL"));
        }
    }

    if config.sanitize.max_depth == 0 {
        errors.push(ValidationError::new("sanitize.max_depth", "must be greater than 0"));
    }
    if config.sanitize.max_body_bytes == 0 {
        errors.push(ValidationError::new("sanitize.max_body_bytes", "must be greater than 0"));
    }

    if config.upload.max_file_bytes == 0 {
        errors.push(ValidationError::new("upload.max_file_bytes", "must be greater than 0"));
    }
    if config.upload.allowed_extensions.is_empty() {
        errors.push(ValidationError::new(
            "upload.allowed_extensions",
            "must name at least one extension",
        ));
    }

    let targets = [
        (
            "datastores.relational_url",
            DatastoreTarget::relational(config.datastores.relational_url.clone()),
        ),
        (
            "datastores.document_url",
            DatastoreTarget::document(config.datastores.document_url.clone()),
        ),
    ];
    for (field, target) in targets {
        if let Err(e) = target.endpoint() {
            errors.push(ValidationError::new(field, e.to_string()));
        }
    }
    if config.datastores.connect_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "datastores.connect_timeout_ms",
            "must be greater than 0",
        ));
    }
    if config.datastores.retry.base_delay_ms > config.datastores.retry.max_delay_ms {
        errors.push(ValidationError::new(
            "datastores.retry.base_delay_ms",
            "must not exceed max_delay_ms",
        ));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("must be one of {}", LOG_LEVELS.join(", ")),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
