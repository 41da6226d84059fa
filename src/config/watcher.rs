//! Configuration file watcher for hot reload.
//!
//! Only rate limit policies are reloaded live; other sections take effect on
//! restart and a change to them is logged.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{GuardConfig, RateLimitConfig};

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GuardConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GuardConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(
                                    error = %e,
                                    "Failed to reload config, keeping current configuration"
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Swap in the reloaded rate limit section. Returns whether it changed.
pub fn apply_reload(current: &ArcSwap<RateLimitConfig>, new_config: GuardConfig) -> bool {
    let old = current.load();
    let changed = old.enabled != new_config.rate_limit.enabled
        || old.policies != new_config.rate_limit.policies;
    if old.store != new_config.rate_limit.store || old.redis_url != new_config.rate_limit.redis_url {
        tracing::warn!("Rate limit store changes take effect after restart");
    }
    drop(old);

    if changed {
        tracing::info!(
            policies = new_config.rate_limit.policies.len(),
            enabled = new_config.rate_limit.enabled,
            "Rate limit policies reloaded"
        );
        current.store(Arc::new(new_config.rate_limit));
    }
    changed
}

/// Apply every reloaded configuration until the channel closes.
pub fn spawn_reload_task(
    mut updates: mpsc::UnboundedReceiver<GuardConfig>,
    rate_limit: Arc<ArcSwap<RateLimitConfig>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(new_config) = updates.recv().await {
            apply_reload(&rate_limit, new_config);
        }
    })
}
