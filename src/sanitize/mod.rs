//! Input sanitization subsystem.
//!
//! # Data Flow
//! ```text
//! Raw request part (body / query / params as serde_json::Value)
//!     → middleware.rs (size limit, JSON parse, body rewrite)
//!     → patterns.rs (denylist signal, used to reject obviously hostile bodies)
//!     → recursive.rs (depth-bounded walk over the value)
//!         → primitives.rs (escape every string leaf and every key)
//!     → SanitizedValue handed to the validation subsystem
//! ```
//!
//! # Design Decisions
//! - Sanitization never fails: bad input degrades to a safe empty value
//! - Escaping is applied exactly once per pipeline pass (it is not idempotent)
//! - Over-deep input is discarded, not partially sanitized (see `DepthPolicy`)

pub mod html;
pub mod middleware;
pub mod patterns;
pub mod primitives;
pub mod recursive;

pub use html::{sanitize_html, DEFAULT_ALLOWED_TAGS};
pub use middleware::{sanitize_body_middleware, InputGuard, SanitizedBody};
pub use patterns::{
    has_suspicious_patterns, query_has_suspicious_patterns, value_has_suspicious_patterns,
};
pub use primitives::{
    escape_html, sanitize_email, sanitize_filename, sanitize_text, sanitize_text_value,
    sanitize_url, FALLBACK_FILENAME, MAX_FILENAME_LEN,
};
pub use recursive::{
    sanitize_input, sanitize_object, DepthPolicy, SanitizeError, Sanitizer, DEFAULT_MAX_DEPTH,
};
