//! Request guard service library.
//!
//! Rate limiting, input sanitization and schema validation for a JSON API,
//! plus datastore bootstrap with retry.

pub mod config;
pub mod datastore;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod sanitize;
pub mod security;
pub mod validation;

pub use config::schema::GuardConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
