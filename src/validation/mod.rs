//! Schema validation subsystem.
//!
//! # Data Flow
//! ```text
//! Request part (body / query / params)
//!     → middleware.rs (extract, sanitize unless already sanitized)
//!     → schema.rs (object rules, unknown keys stripped)
//!         → field.rs (per-field rules, conversion, defaults)
//!     → Ok: normalized value replaces the part
//!     → Err: error.rs (every field error) → 400
//!     → upload.rs (file descriptors on upload routes) → 400 on refusal
//! ```
//!
//! # Design Decisions
//! - Fail-complete: all violations are collected in one pass
//! - Schemas are plain values built once per route and shared via `Arc`
//! - Messages follow the `"field" must be ...` convention clients already parse

pub mod error;
pub mod field;
pub mod middleware;
pub mod schema;
pub mod schemas;
pub mod upload;

pub use error::{FieldError, ValidationErrors, ValidationResult};
pub use field::Field;
pub use middleware::{validate_request, validation_middleware, RequestPart, RequestValidator, Validated};
pub use schema::{Schema, ValidateOptions};
pub use upload::{file_upload_middleware, FileRejection, FileRules, UploadedFile};
