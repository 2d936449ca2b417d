//! Per-resource coordination
//!
//! Each cached resource key gets a [`KeySlot`] holding:
//! - a generation counter, bumped on every invalidation. A population
//!   started under generation `g` may only store its result if the counter
//!   still reads `g`.
//! - a load gate, so concurrent misses on one key trigger a single store
//!   load while misses on other keys proceed independently. When that load
//!   fails because the store is unavailable, callers already queued on the
//!   gate get the same error instead of each retrying with a full timeout.
//!
//! The registry mutex is held only to find or create a slot, never across
//! an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{PermCacheError, Result};

/// Coordination state for one resource key
#[derive(Debug, Default)]
pub struct KeySlot {
    generation: tokio::sync::Mutex<u64>,
    // Store-unavailability error of the most recent finished load, if it failed
    load: tokio::sync::Mutex<Option<PermCacheError>>,
    loads_finished: AtomicU64,
}

impl KeySlot {
    /// Current generation
    pub async fn generation(&self) -> u64 {
        *self.generation.lock().await
    }

    /// Lock the generation counter for a check-and-store or bump-and-delete
    pub async fn lock_generation(&self) -> tokio::sync::MutexGuard<'_, u64> {
        self.generation.lock().await
    }

    /// Number of loads that have finished through this slot's gate
    ///
    /// Read before [`lock_load`](Self::lock_load) to later ask the gate
    /// whether a load finished while waiting.
    pub fn loads_finished(&self) -> u64 {
        self.loads_finished.load(Ordering::Acquire)
    }

    /// Wait for exclusive right to load this key from the store
    pub async fn lock_load(&self) -> LoadGate<'_> {
        LoadGate {
            loads_finished: &self.loads_finished,
            last_failure: self.load.lock().await,
        }
    }
}

/// Held while loading one key; at most one per key at a time
#[derive(Debug)]
pub struct LoadGate<'a> {
    loads_finished: &'a AtomicU64,
    last_failure: tokio::sync::MutexGuard<'a, Option<PermCacheError>>,
}

impl LoadGate<'_> {
    /// The failure of a load that finished after `seen` was read, if it failed
    /// with the store unavailable
    pub fn failure_since(&self, seen: u64) -> Option<PermCacheError> {
        if self.loads_finished.load(Ordering::Acquire) == seen {
            return None;
        }
        self.last_failure
            .as_ref()
            .and_then(PermCacheError::replicate_unavailable)
    }

    /// Record a load's outcome and open the gate
    pub fn finish<T>(mut self, outcome: &Result<T>) {
        *self.last_failure = match outcome {
            Ok(_) => None,
            Err(e) => e.replicate_unavailable(),
        };
        self.loads_finished.fetch_add(1, Ordering::Release);
    }
}

/// Registry of key slots
#[derive(Debug, Default)]
pub struct KeySlots {
    slots: Mutex<HashMap<String, Arc<KeySlot>>>,
}

impl KeySlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `key`, created on first use
    pub fn slot(&self, key: &str) -> Arc<KeySlot> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        let slot = Arc::new(KeySlot::default());
        slots.insert(key.to_string(), Arc::clone(&slot));
        slot
    }

    /// Snapshot of every slot, for bulk invalidation
    pub fn all(&self) -> Vec<Arc<KeySlot>> {
        self.slots.lock().values().cloned().collect()
    }

    /// Drop slots nobody outside the registry holds; returns how many
    ///
    /// An unheld slot has no population in flight, so forgetting its
    /// generation cannot let a stale load slip through.
    pub fn prune_idle(&self) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
