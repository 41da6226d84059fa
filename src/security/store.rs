//! Counter storage for the fixed-window rate limiter.
//!
//! # Responsibilities
//! - Hold one `RateLimitEntry` per (identifier, window index)
//! - Perform read-increment-write atomically per key
//! - Evict entries whose window has passed
//!
//! # Design Decisions
//! - Storage is a trait so a single process can use memory while a scaled-out
//!   deployment shares counters through Redis (`redis-store` feature)
//! - The in-memory store relies on DashMap's per-shard entry lock for
//!   atomicity; nothing else is needed because the read and the write happen
//!   under the same guard

use std::fmt::Debug;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Counter for one identifier within one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub bucket_key: String,
    pub count: u64,
    /// Epoch milliseconds after which the entry is stale.
    pub window_reset_at: u64,
}

impl RateLimitEntry {
    /// A zero-count entry whose window starts now.
    pub fn fresh(bucket_key: &str, now_ms: u64, window_ms: u64) -> Self {
        Self {
            bucket_key: bucket_key.to_string(),
            count: 0,
            window_reset_at: now_ms.saturating_add(window_ms),
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.window_reset_at
    }
}

/// Errors from a counter backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rate limit store backend error: {0}")]
    Backend(String),
}

/// Storage backend for rate limit counters.
#[async_trait]
pub trait RateLimitStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<RateLimitEntry>, StoreError>;

    async fn set(&self, entry: RateLimitEntry) -> Result<(), StoreError>;

    /// Evict every entry whose window has passed. Returns how many were removed.
    async fn sweep(&self, now_ms: u64) -> Result<usize, StoreError>;

    /// Start a fresh window if the key is absent or stale, then count one request.
    ///
    /// The default composes `get` and `set` and is only atomic for callers that
    /// never race on the same key. Backends override it.
    async fn increment(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
    ) -> Result<RateLimitEntry, StoreError> {
        let mut entry = match self.get(key).await? {
            Some(entry) if !entry.is_expired(now_ms) => entry,
            _ => RateLimitEntry::fresh(key, now_ms, window_ms),
        };
        entry.count = entry.count.saturating_add(1);
        self.set(entry.clone()).await?;
        Ok(entry)
    }

    /// Number of live entries, when cheaply known.
    fn len(&self) -> Option<usize> {
        None
    }
}

/// Process-local store backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, RateLimitEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitEntry>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, entry: RateLimitEntry) -> Result<(), StoreError> {
        self.entries.insert(entry.bucket_key.clone(), entry);
        Ok(())
    }

    async fn sweep(&self, now_ms: u64) -> Result<usize, StoreError> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now_ms));
        Ok(before.saturating_sub(self.entries.len()))
    }

    async fn increment(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
    ) -> Result<RateLimitEntry, StoreError> {
        let mut slot = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry::fresh(key, now_ms, window_ms));
        if slot.is_expired(now_ms) {
            *slot = RateLimitEntry::fresh(key, now_ms, window_ms);
        }
        slot.count = slot.count.saturating_add(1);
        Ok(slot.value().clone())
    }

    fn len(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_creates_and_counts() {
        let store = MemoryStore::new();
        let first = store.increment("ip:1:0", 100, 1_000).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.window_reset_at, 1_100);

        let second = store.increment("ip:1:0", 200, 1_000).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.window_reset_at, 1_100);
    }

    #[tokio::test]
    async fn test_increment_restarts_stale_entry() {
        let store = MemoryStore::new();
        store.increment("k", 0, 1_000).await.unwrap();
        store.increment("k", 10, 1_000).await.unwrap();

        let restarted = store.increment("k", 1_001, 1_000).await.unwrap();
        assert_eq!(restarted.count, 1);
        assert_eq!(restarted.window_reset_at, 2_001);
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_passed_windows() {
        let store = MemoryStore::new();
        store.increment("old", 0, 100).await.unwrap();
        store.increment("current", 150, 100).await.unwrap();

        assert_eq!(store.sweep(100).await.unwrap(), 0);
        assert_eq!(store.sweep(101).await.unwrap(), 1);
        assert_eq!(store.len(), Some(1));
        assert!(store.get("current").await.unwrap().is_some());
        assert!(store.get("old").await.unwrap().is_none());
    }

    #[derive(Debug, Default)]
    struct GetSetOnly(MemoryStore);

    #[async_trait]
    impl RateLimitStore for GetSetOnly {
        async fn get(&self, key: &str) -> Result<Option<RateLimitEntry>, StoreError> {
            self.0.get(key).await
        }
        async fn set(&self, entry: RateLimitEntry) -> Result<(), StoreError> {
            self.0.set(entry).await
        }
        async fn sweep(&self, now_ms: u64) -> Result<usize, StoreError> {
            self.0.sweep(now_ms).await
        }
    }

    #[tokio::test]
    async fn test_default_increment_uses_get_and_set() {
        let store = GetSetOnly::default();
        store.increment("k", 0, 50).await.unwrap();
        let entry = store.increment("k", 1, 50).await.unwrap();
        assert_eq!(entry.count, 2);
        assert_eq!(store.len(), None);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store.increment("shared", 0, 60_000).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get("shared").await.unwrap().unwrap().count, 800);
    }
}
