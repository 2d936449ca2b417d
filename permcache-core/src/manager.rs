//! Permission cache manager
//!
//! Answers "may subject S perform action A on resource R" from a cached
//! per-resource [`ResourcePermissionSet`], loading from the
//! [`PermissionStore`] on a miss.
//!
//! ## Read path
//!
//! ```text
//!  has_permission ──► cache.get ──hit──► set.allows(subject, action)
//!                        │
//!                       miss
//!                        ▼
//!                 per-key load gate ──► re-check cache, or share a
//!                        │              failed load (coalesced)
//!                        │
//!                 read generation g
//!                        ▼
//!                 store.select_grants   (timeout-bounded, no key lock held)
//!                        ▼
//!                 generation still g? ──yes──► cache.set(key, set, jittered ttl)
//!                        │
//!                        no ──► discard (an invalidation won)
//! ```
//!
//! ## Write path
//!
//! Grants and revokes commit to the store first, then bump the key's
//! generation and delete its cache entry under the same per-key lock. A
//! cached set is never patched in place.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheBackend, CacheStats, ExpiryPolicy, MemoryCache};
use crate::config::ManagerConfig;
use crate::error::{PermCacheError, Result};
use crate::grant::{Action, PermissionGrant, ResourcePermissionSet, ResourceRef, SubjectId};
use crate::keys::{KeySlot, KeySlots};
use crate::store::PermissionStore;

/// Manager statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerStats {
    /// Permission checks answered (successfully or not)
    pub checks: u64,
    /// Checks answered from the cache
    pub cache_hits: u64,
    /// Checks that missed the cache
    pub cache_misses: u64,
    /// Misses satisfied by another caller's in-flight load
    pub coalesced_loads: u64,
    /// Store loads attempted
    pub loads: u64,
    /// Store loads that failed or timed out
    pub load_failures: u64,
    /// Loaded sets dropped because an invalidation raced them
    pub discarded_populations: u64,
    /// Cache invalidations issued
    pub invalidations: u64,
    /// Grants written
    pub grants: u64,
    /// Revokes that removed a grant
    pub revokes: u64,
    /// Resource keys currently tracked for coordination
    pub tracked_keys: usize,
    /// Cache backend statistics
    pub cache: CacheStats,
}

#[derive(Debug, Default)]
struct Counters {
    checks: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced_loads: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    discarded_populations: AtomicU64,
    invalidations: AtomicU64,
    grants: AtomicU64,
    revokes: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Result of one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Expired cache entries removed
    pub purged_entries: usize,
    /// Idle key slots forgotten
    pub pruned_slots: usize,
}

/// The permission cache manager
///
/// Build one at service startup and share it (`Arc`) with every caller.
pub struct PermissionCacheManager {
    store: Arc<dyn PermissionStore>,
    cache: Arc<dyn CacheBackend>,
    config: ManagerConfig,
    expiry: ExpiryPolicy,
    slots: KeySlots,
    counters: Counters,
}

impl std::fmt::Debug for PermissionCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCacheManager")
            .field("store", &self.store.name())
            .field("cache", &self.cache.name())
            .field("config", &self.config)
            .finish()
    }
}

impl PermissionCacheManager {
    /// Create a manager over explicit store and cache backends
    pub fn new(
        store: Arc<dyn PermissionStore>,
        cache: Arc<dyn CacheBackend>,
        config: ManagerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            cache,
            expiry: ExpiryPolicy::from_config(&config.cache),
            config,
            slots: KeySlots::new(),
            counters: Counters::default(),
        })
    }

    /// Create a manager with an in-process [`MemoryCache`] sized from config
    pub fn with_memory_cache(store: Arc<dyn PermissionStore>, config: ManagerConfig) -> Result<Self> {
        let cache = Arc::new(MemoryCache::new(config.cache.max_entries));
        Self::new(store, cache, config)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn expiry(&self) -> &ExpiryPolicy {
        &self.expiry
    }

    /// Whether `subject` may perform `action` on `resource`
    ///
    /// A resource with no grants answers `false`. A store failure during
    /// a miss is an error, never `false`.
    pub async fn has_permission(
        &self,
        subject: &SubjectId,
        resource: &ResourceRef,
        action: &Action,
    ) -> Result<bool> {
        bump(&self.counters.checks);
        let set = self.permission_set(resource).await?;
        let allowed = set.allows(subject, action);
        debug!(%subject, %resource, %action, allowed, "permission check");
        Ok(allowed)
    }

    /// As [`has_permission`](Self::has_permission), parsing raw identifiers
    ///
    /// Malformed input fails with `InvalidGrantRequest` before any store or
    /// cache access. `resource` is `"type:id"` or a bare device id.
    pub async fn check(&self, subject: &str, resource: &str, action: &str) -> Result<bool> {
        let subject = SubjectId::new(subject)?;
        let resource = ResourceRef::parse(resource)?;
        let action = Action::new(action)?;
        self.has_permission(&subject, &resource, &action).await
    }

    /// The full permission set for a resource, through the cache
    pub async fn permission_set(&self, resource: &ResourceRef) -> Result<ResourcePermissionSet> {
        if !self.config.cache.enabled {
            return self.load(resource).await;
        }

        let key = resource.cache_key();
        if let Some(set) = self.cached(&key).await {
            bump(&self.counters.cache_hits);
            return Ok(set);
        }
        bump(&self.counters.cache_misses);

        let slot = self.slots.slot(&key);
        let seen = slot.loads_finished();
        let gate = slot.lock_load().await;

        // Another caller may have populated while we waited on the gate.
        if let Some(set) = self.cached(&key).await {
            bump(&self.counters.coalesced_loads);
            return Ok(set);
        }
        // Or its load may have failed with the store unreachable.
        if let Some(err) = gate.failure_since(seen) {
            bump(&self.counters.coalesced_loads);
            debug!(key, error = %err, "sharing failed load with queued caller");
            return Err(err);
        }

        let generation = slot.generation().await;
        let loaded = self.load(resource).await;
        if let Ok(set) = &loaded {
            self.populate(&slot, &key, generation, set).await;
        }
        gate.finish(&loaded);
        loaded
    }

    /// Grant `action` on `resource` to `subject`
    ///
    /// Writes the grant, then invalidates the resource's cached set. Granting
    /// an existing triple returns the stored grant.
    pub async fn grant_permission(
        &self,
        resource: &ResourceRef,
        subject: &SubjectId,
        action: &Action,
    ) -> Result<PermissionGrant> {
        let grant = PermissionGrant::new(resource.clone(), subject.clone(), action.clone());
        let written = self.call_store(self.store.insert_grant(&grant)).await;
        // Invalidate even when the write errored: a timed-out insert may
        // still have committed.
        let invalidated = self.invalidate(resource).await;
        let stored = written?;
        invalidated?;

        bump(&self.counters.grants);
        info!(%resource, %subject, %action, grant_id = %stored.grant_id, "permission granted");
        Ok(stored)
    }

    /// Revoke `action` on `resource` from `subject`; returns whether a grant was removed
    pub async fn revoke_permission(
        &self,
        resource: &ResourceRef,
        subject: &SubjectId,
        action: &Action,
    ) -> Result<bool> {
        let deleted = self
            .call_store(self.store.delete_grant(resource, subject, action))
            .await;
        let invalidated = self.invalidate(resource).await;
        let removed = deleted?;
        invalidated?;

        if removed {
            bump(&self.counters.revokes);
            info!(%resource, %subject, %action, "permission revoked");
        } else {
            debug!(%resource, %subject, %action, "revoke matched no grant");
        }
        Ok(removed)
    }

    /// Drop the cached set for `resource` and fence off in-flight loads
    pub async fn invalidate(&self, resource: &ResourceRef) -> Result<()> {
        let key = resource.cache_key();
        let slot = self.slots.slot(&key);
        let mut generation = slot.lock_generation().await;
        *generation += 1;
        bump(&self.counters.invalidations);
        let deleted = self.cache.delete(&key).await;
        drop(generation);

        deleted.map_err(|e| {
            warn!(%resource, error = %e, "cache invalidation failed");
            PermCacheError::cache_unavailable(self.cache.name(), e.to_string())
        })
    }

    /// Drop every cached set and fence off every in-flight load
    pub async fn invalidate_all(&self) -> Result<()> {
        for slot in self.slots.all() {
            *slot.lock_generation().await += 1;
        }
        bump(&self.counters.invalidations);
        self.cache.clear().await.map_err(|e| {
            warn!(error = %e, "cache clear failed");
            PermCacheError::cache_unavailable(self.cache.name(), e.to_string())
        })
    }

    /// Purge expired entries and forget idle key slots
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let purged_entries = match self.cache.purge_expired().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "cache purge failed");
                0
            }
        };
        let pruned_slots = self.slots.prune_idle();
        debug!(purged_entries, pruned_slots, "maintenance pass");
        MaintenanceReport {
            purged_entries,
            pruned_slots,
        }
    }

    /// Probe the store
    pub async fn health_check(&self) -> Result<()> {
        self.call_store(self.store.health_check()).await
    }

    /// Get manager statistics
    pub fn stats(&self) -> ManagerStats {
        let c = &self.counters;
        ManagerStats {
            checks: c.checks.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            cache_misses: c.cache_misses.load(Ordering::Relaxed),
            coalesced_loads: c.coalesced_loads.load(Ordering::Relaxed),
            loads: c.loads.load(Ordering::Relaxed),
            load_failures: c.load_failures.load(Ordering::Relaxed),
            discarded_populations: c.discarded_populations.load(Ordering::Relaxed),
            invalidations: c.invalidations.load(Ordering::Relaxed),
            grants: c.grants.load(Ordering::Relaxed),
            revokes: c.revokes.load(Ordering::Relaxed),
            tracked_keys: self.slots.len(),
            cache: self.cache.stats(),
        }
    }

    async fn cached(&self, key: &str) -> Option<ResourcePermissionSet> {
        match self.cache.get(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, falling back to store");
                None
            }
        }
    }

    async fn load(&self, resource: &ResourceRef) -> Result<ResourcePermissionSet> {
        bump(&self.counters.loads);
        match self.call_store(self.store.select_grants(resource)).await {
            Ok(grants) => Ok(ResourcePermissionSet::from_grants(&grants)),
            Err(e) => {
                bump(&self.counters.load_failures);
                warn!(%resource, error = %e, "permission load failed");
                Err(e)
            }
        }
    }

    async fn populate(&self, slot: &KeySlot, key: &str, generation: u64, set: &ResourcePermissionSet) {
        let current = slot.lock_generation().await;
        if *current != generation {
            bump(&self.counters.discarded_populations);
            debug!(
                key,
                loaded_at = generation,
                current = *current,
                "discarding population raced by invalidation"
            );
            return;
        }

        let ttl = self.expiry.next_ttl();
        if let Err(e) = self.cache.set(key, set.clone(), ttl).await {
            warn!(key, error = %e, "cache write failed");
        }
    }

    async fn call_store<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timeout = self.config.store.timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PermCacheError::StoreTimeout {
                store: self.store.name().to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
