//! Pluggable permission store
//!
//! The store is the source of truth for grants. It knows nothing about
//! caching; the [`PermissionCacheManager`](crate::PermissionCacheManager)
//! sits in front of it.
//!
//! Two backends are provided:
//! - [`InMemoryStore`] for tests and embedding
//! - [`FileStore`] for a single-node deployment or the CLI
//!
//! A relational backend implements the same trait; each method maps to one
//! transactional statement.
//!
//! # Example
//!
//! ```rust
//! use permcache_core::store::{InMemoryStore, PermissionStore};
//!
//! let store = InMemoryStore::new();
//! assert_eq!(store.name(), "in-memory");
//! ```

mod file;

pub use file::FileStore;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{PermCacheError, Result};
use crate::grant::{Action, PermissionGrant, ResourceRef, SubjectId};

/// Storage backend trait for grants
///
/// All methods take `&self`; implementations use interior mutability.
/// Each call is durable and transactional on its own.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// All grants on a resource (empty when none)
    async fn select_grants(&self, resource: &ResourceRef) -> Result<Vec<PermissionGrant>>;

    /// Persist a grant
    ///
    /// Idempotent on the (resource, subject, action) triple: if a matching
    /// grant exists it is returned unchanged and nothing is written.
    async fn insert_grant(&self, grant: &PermissionGrant) -> Result<PermissionGrant>;

    /// Delete the grant matching the triple; returns whether a row was removed
    async fn delete_grant(
        &self,
        resource: &ResourceRef,
        subject: &SubjectId,
        action: &Action,
    ) -> Result<bool>;

    /// Check if backend is healthy
    async fn health_check(&self) -> Result<()>;

    /// Backend name (for logging)
    fn name(&self) -> &'static str;
}

/// In-memory store
///
/// Grants are lost on restart. `set_available(false)` makes every call fail
/// with [`PermCacheError::StoreUnavailable`], which is how tests exercise the
/// "unknown, not denied" path.
#[derive(Debug)]
pub struct InMemoryStore {
    grants: RwLock<HashMap<ResourceRef, Vec<PermissionGrant>>>,
    available: AtomicBool,
    selects: AtomicU64,
    writes: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            grants: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            selects: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Simulate the store going down or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `select_grants` calls that reached the store
    pub fn select_count(&self) -> u64 {
        self.selects.load(Ordering::SeqCst)
    }

    /// Number of insert/delete calls that reached the store
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Total grants across all resources
    pub fn total_grants(&self) -> usize {
        self.grants.read().values().map(Vec::len).sum()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PermCacheError::store_unavailable(
                self.name(),
                "store marked unavailable",
            ))
        }
    }
}

#[async_trait]
impl PermissionStore for InMemoryStore {
    async fn select_grants(&self, resource: &ResourceRef) -> Result<Vec<PermissionGrant>> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        Ok(self.grants.read().get(resource).cloned().unwrap_or_default())
    }

    async fn insert_grant(&self, grant: &PermissionGrant) -> Result<PermissionGrant> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        let mut grants = self.grants.write();
        let rows = grants.entry(grant.resource.clone()).or_default();
        if let Some(existing) = rows
            .iter()
            .find(|g| g.matches(&grant.resource, &grant.subject, &grant.action))
        {
            return Ok(existing.clone());
        }
        rows.push(grant.clone());
        Ok(grant.clone())
    }

    async fn delete_grant(
        &self,
        resource: &ResourceRef,
        subject: &SubjectId,
        action: &Action,
    ) -> Result<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        let mut grants = self.grants.write();
        let Some(rows) = grants.get_mut(resource) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|g| !g.matches(resource, subject, action));
        let removed = rows.len() != before;
        if rows.is_empty() {
            grants.remove(resource);
        }
        Ok(removed)
    }

    async fn health_check(&self) -> Result<()> {
        self.ensure_available()
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
