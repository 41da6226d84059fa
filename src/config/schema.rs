//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sanitize::DepthPolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Input sanitization settings.
    pub sanitize: SanitizeConfig,

    /// File upload screening.
    pub upload: UploadConfig,

    /// Datastore connection bootstrap settings.
    pub datastores: DatastoreConfig,

    /// Response hardening.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Where rate limit counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Process-local map. Limits are per instance.
    #[default]
    Memory,
    /// Shared Redis counters (requires the `redis-store` feature).
    Redis,
}

/// A named fixed-window limit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitPolicy {
    /// Window length in milliseconds.
    pub window_ms: u64,

    /// Requests admitted per identifier per window.
    pub max_requests: u64,

    /// Message returned with 429 responses.
    #[serde(default = "default_limit_message")]
    pub message: String,
}

fn default_limit_message() -> String {
    "Too many requests, please try again later.".to_string()
}

impl RateLimitPolicy {
    pub fn new(window_ms: u64, max_requests: u64, message: &str) -> Self {
        Self {
            window_ms,
            max_requests,
            message: message.to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Counter backend.
    pub store: StoreKind,

    /// Redis URL when `store = "redis"`.
    pub redis_url: String,

    /// Prefix for Redis keys.
    pub key_prefix: String,

    /// Named policies referenced by routes.
    pub policies: BTreeMap<String, RateLimitPolicy>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        const MINUTE: u64 = 60 * 1000;
        let policies = BTreeMap::from([
            (
                "general".to_string(),
                RateLimitPolicy::new(
                    15 * MINUTE,
                    100,
                    "Too many requests from this IP, please try again later.",
                ),
            ),
            (
                "auth".to_string(),
                RateLimitPolicy::new(
                    15 * MINUTE,
                    10,
                    "Too many authentication attempts, please try again later.",
                ),
            ),
            (
                "upload".to_string(),
                RateLimitPolicy::new(
                    60 * MINUTE,
                    20,
                    "Too many file uploads, please try again later.",
                ),
            ),
            (
                "search".to_string(),
                RateLimitPolicy::new(MINUTE, 30, "Too many search requests, please slow down."),
            ),
            (
                "daily".to_string(),
                RateLimitPolicy::new(
                    24 * 60 * MINUTE,
                    100,
                    "Daily API limit exceeded. Please try again tomorrow.",
                ),
            ),
            (
                "csrf_token".to_string(),
                RateLimitPolicy::new(
                    MINUTE,
                    30,
                    "Too many CSRF token requests, please try again later.",
                ),
            ),
        ]);

        Self {
            enabled: true,
            store: StoreKind::Memory,
            redis_url: "redis://127.0.0.1/".to_string(),
            key_prefix: "request-guard:".to_string(),
            policies,
        }
    }
}

/// Input sanitization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizeConfig {
    /// Maximum nesting depth of request values.
    pub max_depth: usize,

    /// Behaviour for values nested deeper than `max_depth`.
    pub depth_policy: DepthPolicy,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Reject bodies matching known script-injection patterns.
    pub reject_suspicious: bool,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            max_depth: crate::sanitize::DEFAULT_MAX_DEPTH,
            depth_policy: DepthPolicy::Truncate,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            reject_suspicious: true,
        }
    }
}

/// File upload screening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Lowercase file extensions accepted for upload.
    pub allowed_extensions: Vec<String>,

    /// Maximum size of one uploaded file in bytes.
    pub max_file_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: crate::validation::upload::DOCUMENT_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_file_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Backoff strategy between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Retry configuration for datastore bootstrap.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts before giving up. Absent means retry forever.
    pub max_attempts: Option<u32>,

    /// Backoff strategy.
    pub backoff: BackoffKind,

    /// Delay between attempts (fixed) or first delay (exponential), in milliseconds.
    pub base_delay_ms: u64,

    /// Cap for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff: BackoffKind::Fixed,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
        }
    }
}

/// Datastore connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Relational store URL (overridden by `DATABASE_URL`).
    pub relational_url: String,

    /// Document store URL (overridden by `MONGODB_URI`).
    pub document_url: String,

    /// Per-attempt connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Retry policy shared by both targets.
    pub retry: RetryConfig,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            relational_url: "postgres://localhost:5432/platform".to_string(),
            document_url: "mongodb://localhost:27017/platform".to_string(),
            connect_timeout_ms: 5000,
            retry: RetryConfig::default(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security headers.
    pub enable_headers: bool,

    /// Content-Security-Policy header value.
    pub content_security_policy: String,

    /// HSTS max-age in seconds, sent only on HTTPS requests.
    pub hsts_max_age_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            content_security_policy: [
                "default-src 'self'",
                "script-src 'self'",
                "style-src 'self'",
                "img-src 'self' data: https: blob:",
                "frame-ancestors 'none'",
                "base-uri 'self'",
                "form-action 'self'",
                "object-src 'none'",
            ]
            .join("; "),
            hsts_max_age_secs: 31_536_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: GuardConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.datastores.retry.base_delay_ms, 2000);
        assert_eq!(config.datastores.retry.max_attempts, None);
        assert_eq!(config.sanitize.max_depth, 10);
        assert!(config.rate_limit.policies.contains_key("auth"));
    }

    #[test]
    fn test_policy_table_parses() {
        let config: GuardConfig = toml::from_str(
            r#"
            [rate_limit]
            store = "memory"

            [rate_limit.policies.login]
            window_ms = 1000
            max_requests = 3

            [sanitize]
            depth_policy = "reject"

            [datastores.retry]
            max_attempts = 5
            backoff = "exponential"
            "#,
        )
        .unwrap();

        let login = &config.rate_limit.policies["login"];
        assert_eq!(login.max_requests, 3);
        assert_eq!(login.message, "Too many requests, please try again later.");
        // An explicit policy table replaces the default set.
        assert!(!config.rate_limit.policies.contains_key("auth"));
        assert_eq!(config.sanitize.depth_policy, DepthPolicy::Reject);
        assert_eq!(config.datastores.retry.max_attempts, Some(5));
        assert_eq!(config.datastores.retry.backoff, BackoffKind::Exponential);
    }
}
