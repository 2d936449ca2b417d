//! Cache backing layer
//!
//! Provides:
//! - [`CacheBackend`]: key-value with per-entry TTL, the only thing the
//!   manager needs from a cache (in-process map, Redis, memcached, ...)
//! - [`MemoryCache`]: the in-process implementation
//! - [`ExpiryPolicy`]: base TTL plus random jitter, so entries loaded
//!   together do not all expire together
//!
//! Values are whole [`ResourcePermissionSet`]s keyed by
//! [`ResourceRef::cache_key`](crate::grant::ResourceRef::cache_key). There is
//! no partial update operation on purpose.

mod expiry;
mod memory;

pub use expiry::ExpiryPolicy;
pub use memory::MemoryCache;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::Result;
use crate::grant::ResourcePermissionSet;

/// Key-value cache with TTL support
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a live entry; expired entries read as absent
    async fn get(&self, key: &str) -> Result<Option<ResourcePermissionSet>>;

    /// Store a value that expires after `ttl`, replacing any previous value
    async fn set(&self, key: &str, value: ResourcePermissionSet, ttl: Duration) -> Result<()>;

    /// Remove a key (no-op when absent)
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every key
    async fn clear(&self) -> Result<()>;

    /// Drop expired entries eagerly; returns how many were removed
    ///
    /// Backends with native expiry (e.g. Redis) keep the default.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }

    /// Current statistics
    fn stats(&self) -> CacheStats;

    /// Backend name (for logging)
    fn name(&self) -> &'static str;
}

/// A cached permission set with its expiry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Resource cache key
    pub key: String,
    /// The permission set as loaded from the store
    pub value: ResourcePermissionSet,
    /// When it was cached
    pub cached_at: Instant,
    /// When it expires
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Check if this entry has expired
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Get time until expiration
    pub fn ttl_remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache (live and not yet purged)
    pub entry_count: usize,

    /// Total cache hits
    pub hits: u64,

    /// Total cache misses
    pub misses: u64,

    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,

    /// Entries removed by expiry or capacity pressure
    pub evictions: u64,
}

impl CacheStats {
    pub(crate) fn compute_hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        }
    }
}
