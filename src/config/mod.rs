//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, apply DATABASE_URL / MONGODB_URI /
//!       REQUEST_GUARD_BIND overrides)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of Arc<RateLimitConfig>
//!     → rate limit middleware observes new policies
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only rate limit policies hot-reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    DatastoreConfig, GuardConfig, ListenerConfig, ObservabilityConfig, RateLimitConfig,
    RateLimitPolicy, RetryConfig, SanitizeConfig, SecurityConfig, TimeoutConfig, UploadConfig,
};
