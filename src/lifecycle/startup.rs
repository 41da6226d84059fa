//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the relational and document stores (retrying until reachable)
//! - Build the rate limit store named by configuration
//! - Bind the listener and assemble the HTTP server
//!
//! # Design Decisions
//! - Fail fast: an invalid store or bind address is fatal
//! - Datastores connect before the listener binds (traffic only when ready)
//! - Config, logging and metrics are initialized by the caller first

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::schema::StoreKind;
use crate::config::{GuardConfig, RateLimitConfig};
use crate::datastore::{Bootstrap, BootstrapError};
use crate::http::HttpServer;
use crate::security::clock::SystemClock;
use crate::security::{MemoryStore, RateLimitStore, RateLimiter, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Datastore(#[from] BootstrapError),

    #[error("rate limit store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// A server with its listener bound, ready to serve.
pub struct Prepared {
    pub server: HttpServer,
    pub listener: TcpListener,
}

/// Build the limiter over the configured counter store.
pub async fn build_limiter(config: &RateLimitConfig) -> Result<Arc<RateLimiter>, StartupError> {
    let store: Arc<dyn RateLimitStore> = match config.store {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        #[cfg(feature = "redis-store")]
        StoreKind::Redis => {
            let store = crate::security::redis_store::RedisStore::connect(
                &config.redis_url,
                config.key_prefix.clone(),
            )
            .await?;
            tracing::info!(key_prefix = %config.key_prefix, "Using Redis rate limit store");
            Arc::new(store)
        }
        #[cfg(not(feature = "redis-store"))]
        StoreKind::Redis => {
            return Err(StoreError::Backend(
                "built without the `redis-store` feature".to_string(),
            )
            .into())
        }
    };
    Ok(Arc::new(RateLimiter::new(store, Arc::new(SystemClock))))
}

/// Connect datastores, build the limiter, and bind the listener.
pub async fn prepare(config: GuardConfig) -> Result<Prepared, StartupError> {
    let connections = Bootstrap::from_config(&config.datastores).connect_all().await?;
    tracing::info!(
        relational = %connections.relational.endpoint,
        document = %connections.document.endpoint,
        "Datastores connected"
    );

    let limiter = build_limiter(&config.rate_limit).await?;

    let address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;

    let server = HttpServer::new(config, limiter, Some(connections));
    Ok(Prepared { server, listener })
}
