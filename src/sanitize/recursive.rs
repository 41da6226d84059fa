//! Depth-bounded recursive sanitization of request values.
//!
//! # Depth semantics
//! The walk starts with the configured `max_depth` and decrements it once per
//! level. Any value reached with depth zero is replaced by an empty mapping,
//! so with the default depth of 10 a leaf nested under ten mappings is lost
//! while one nested under nine survives. The loss is silent by default
//! ([`DepthPolicy::Truncate`]); [`DepthPolicy::Reject`] reports it instead.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::observability::metrics;
use crate::sanitize::primitives::sanitize_text;

/// Default maximum nesting depth for request values.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// What to do with values nested deeper than the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthPolicy {
    /// Replace the over-deep value with `{}` and carry on.
    #[default]
    Truncate,
    /// Fail the whole sanitization pass.
    Reject,
}

/// Errors produced by a [`Sanitizer`] configured to reject.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("input nested deeper than {max_depth} levels")]
    DepthExceeded { max_depth: usize },
}

/// Recursive sanitizer over `serde_json::Value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sanitizer {
    max_depth: usize,
    depth_policy: DepthPolicy,
    strip_operator_keys: bool,
    trim_strings: bool,
}

#[derive(Debug, Default)]
struct WalkStats {
    truncated: usize,
    stripped_keys: Vec<String>,
}

impl Sanitizer {
    /// Plain escaping walk with the given depth limit.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            depth_policy: DepthPolicy::Truncate,
            strip_operator_keys: false,
            trim_strings: false,
        }
    }

    /// Walk used at the request boundary: also drops NoSQL operator keys
    /// and trims string leaves.
    pub fn for_input(max_depth: usize) -> Self {
        Self {
            strip_operator_keys: true,
            trim_strings: true,
            ..Self::new(max_depth)
        }
    }

    pub fn with_depth_policy(mut self, policy: DepthPolicy) -> Self {
        self.depth_policy = policy;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn depth_policy(&self) -> DepthPolicy {
        self.depth_policy
    }

    /// Sanitize a value, mirroring its structure.
    ///
    /// Only fails when the depth policy is [`DepthPolicy::Reject`].
    pub fn sanitize(&self, value: &Value) -> Result<Value, SanitizeError> {
        let mut stats = WalkStats::default();
        let result = self.walk(value, self.max_depth, &mut stats);

        if !stats.stripped_keys.is_empty() {
            tracing::warn!(
                security_event = "nosql_operator_stripped",
                keys = ?stats.stripped_keys,
                "Removed operator-shaped keys from input"
            );
        }
        if stats.truncated > 0 {
            tracing::debug!(
                truncated = stats.truncated,
                max_depth = self.max_depth,
                "Discarded values nested beyond depth limit"
            );
            metrics::record_sanitizer_truncations(stats.truncated);
        }

        result
    }

    fn walk(&self, value: &Value, depth: usize, stats: &mut WalkStats) -> Result<Value, SanitizeError> {
        if depth == 0 {
            return match self.depth_policy {
                DepthPolicy::Truncate => {
                    stats.truncated += 1;
                    Ok(Value::Object(Map::new()))
                }
                DepthPolicy::Reject => Err(SanitizeError::DepthExceeded {
                    max_depth: self.max_depth,
                }),
            };
        }

        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(value.clone()),
            Value::String(s) => {
                let s = if self.trim_strings { s.trim() } else { s.as_str() };
                Ok(Value::String(sanitize_text(s)))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.walk(item, depth - 1, stats))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, item) in map {
                    if self.strip_operator_keys && is_operator_key(key) {
                        stats.stripped_keys.push(key.clone());
                        continue;
                    }
                    out.insert(sanitize_text(key), self.walk(item, depth - 1, stats)?);
                }
                Ok(Value::Object(out))
            }
        }
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

/// Keys a document store would interpret as operators or path traversal.
fn is_operator_key(key: &str) -> bool {
    key.starts_with('$') || key.contains('.')
}

/// Escape every string leaf and key of `value`, discarding anything nested
/// deeper than `max_depth`.
pub fn sanitize_object(value: &Value, max_depth: usize) -> Value {
    Sanitizer::new(max_depth)
        .sanitize(value)
        .unwrap_or_else(|_| Value::Object(Map::new()))
}

/// Boundary sanitization: drops operator-shaped keys, trims and escapes
/// strings, bounded by [`DEFAULT_MAX_DEPTH`].
pub fn sanitize_input(value: &Value) -> Value {
    Sanitizer::for_input(DEFAULT_MAX_DEPTH)
        .sanitize(value)
        .unwrap_or_else(|_| Value::Object(Map::new()))
}
