//! In-process cache backend

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;

use super::{CacheBackend, CacheEntry, CacheStats};
use crate::error::Result;
use crate::grant::ResourcePermissionSet;

// Roughly 30 years, the same horizon tokio uses for "never"
fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(86400 * 365 * 30)
}

/// TTL-aware in-memory cache
///
/// Expiry is measured on the tokio clock, so tests running with a paused
/// runtime can move time forward with `tokio::time::advance`.
///
/// At capacity, expired entries are evicted first, then the oldest entry.
#[derive(Debug)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryCache {
    /// Create a cache holding at most `max_entries` resources
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Inspect an entry without touching hit/miss counters
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn evict_expired(&self, entries: &mut HashMap<String, CacheEntry>) -> usize {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, v| v.expires_at > now);
        let evicted = before - entries.len();
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    fn evict_oldest(&self, entries: &mut HashMap<String, CacheEntry>) {
        if let Some(oldest_key) = entries
            .iter()
            .min_by_key(|(_, v)| v.cached_at)
            .map(|(k, _)| k.clone())
        {
            entries.remove(&oldest_key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<ResourcePermissionSet>> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.value.clone()))
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: ResourcePermissionSet, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            cached_at: now,
            expires_at: now.checked_add(ttl).unwrap_or_else(|| far_future(now)),
        };

        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            self.evict_expired(&mut entries);
            if entries.len() >= self.max_entries {
                self.evict_oldest(&mut entries);
            }
        }
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let mut entries = self.entries.write();
        Ok(self.evict_expired(&mut entries))
    }

    fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            entry_count: self.entries.read().len(),
            hits,
            misses,
            hit_rate: CacheStats::compute_hit_rate(hits, misses),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
