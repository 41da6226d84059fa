//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (fixed-window check per user or IP, named policy)
//!         → store.rs / redis_store.rs (counter storage)
//!         → clock.rs (window alignment)
//!     → [sanitize + validate pipeline]
//!     → Handler
//!     → headers.rs (security response headers)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - The limiter fails open on store errors; validation fails closed
//! - No trust in client input

pub mod clock;
pub mod headers;
pub mod rate_limit;
#[cfg(feature = "redis-store")]
pub mod redis_store;
pub mod store;

pub use rate_limit::{Identity, RateLimitDecision, RateLimitState, RateLimiter};
pub use store::{MemoryStore, RateLimitEntry, RateLimitStore, StoreError};
