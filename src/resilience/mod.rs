//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an external dependency (datastore connect):
//!     → retries.rs (attempt, on failure decide whether to go again)
//!     → backoff.rs (delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Every attempt carries its own deadline (applied by the caller)
//! - Retry policy is data, shared by all datastore targets
//! - Default policy never gives up: startup waits for its dependencies

pub mod backoff;
pub mod retries;

pub use backoff::Backoff;
pub use retries::{MaxAttempts, RetryError, RetryPolicy};
