//! Shared test fixtures

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use permcache_core::{
    Action, CacheConfig, InMemoryStore, ManagerConfig, PermissionCacheManager, PermissionGrant,
    PermissionStore, ResourceRef, Result, SubjectId,
};

pub fn device(id: u32) -> ResourceRef {
    ResourceRef::device(id).unwrap()
}

pub fn subject(id: &str) -> SubjectId {
    SubjectId::new(id).unwrap()
}

pub fn action(name: &str) -> Action {
    Action::new(name).unwrap()
}

/// Config with a store timeout long enough that gated loads never time out
pub fn patient_config() -> ManagerConfig {
    ManagerConfig::default().with_store_timeout(Duration::from_secs(30))
}

pub fn fixed_ttl_config(ttl: Duration) -> ManagerConfig {
    ManagerConfig::default().with_cache(
        CacheConfig::default()
            .with_base_ttl(ttl)
            .with_max_jitter(Duration::ZERO),
    )
}

pub fn manager_over(store: Arc<dyn PermissionStore>, config: ManagerConfig) -> PermissionCacheManager {
    PermissionCacheManager::with_memory_cache(store, config).unwrap()
}

/// Store whose `select_grants` can be paused after it has read its snapshot
///
/// While a resource is held, a select on it reads the inner store, signals
/// `entered`, then waits for `release` before returning that (possibly now
/// stale) snapshot. Other resources and all writes pass straight through.
pub struct GatedStore {
    pub inner: InMemoryStore,
    held: Mutex<Option<ResourceRef>>,
    entered: Notify,
    release: Notify,
}

impl GatedStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            held: Mutex::new(None),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn hold(&self, resource: &ResourceRef) {
        *self.held.lock().unwrap() = Some(resource.clone());
    }

    fn is_held(&self, resource: &ResourceRef) -> bool {
        self.held.lock().unwrap().as_ref() == Some(resource)
    }

    /// Wait until a held select has taken its snapshot
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Stop holding and let the paused select return
    pub fn release(&self) {
        *self.held.lock().unwrap() = None;
        self.release.notify_one();
    }
}

#[async_trait]
impl PermissionStore for GatedStore {
    async fn select_grants(&self, resource: &ResourceRef) -> Result<Vec<PermissionGrant>> {
        let snapshot = self.inner.select_grants(resource).await?;
        if self.is_held(resource) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(snapshot)
    }

    async fn insert_grant(&self, grant: &PermissionGrant) -> Result<PermissionGrant> {
        self.inner.insert_grant(grant).await
    }

    async fn delete_grant(
        &self,
        resource: &ResourceRef,
        subject: &SubjectId,
        action: &Action,
    ) -> Result<bool> {
        self.inner.delete_grant(resource, subject, action).await
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

/// Store that takes `delay` to answer any call
pub struct SlowStore {
    pub inner: InMemoryStore,
    pub delay: Duration,
}

#[async_trait]
impl PermissionStore for SlowStore {
    async fn select_grants(&self, resource: &ResourceRef) -> Result<Vec<PermissionGrant>> {
        tokio::time::sleep(self.delay).await;
        self.inner.select_grants(resource).await
    }

    async fn insert_grant(&self, grant: &PermissionGrant) -> Result<PermissionGrant> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_grant(grant).await
    }

    async fn delete_grant(
        &self,
        resource: &ResourceRef,
        subject: &SubjectId,
        action: &Action,
    ) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete_grant(resource, subject, action).await
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

/// Store whose reads never answer; writes pass through
pub struct HangingStore {
    pub inner: InMemoryStore,
}

#[async_trait]
impl PermissionStore for HangingStore {
    async fn select_grants(&self, _resource: &ResourceRef) -> Result<Vec<PermissionGrant>> {
        std::future::pending().await
    }

    async fn insert_grant(&self, grant: &PermissionGrant) -> Result<PermissionGrant> {
        self.inner.insert_grant(grant).await
    }

    async fn delete_grant(
        &self,
        resource: &ResourceRef,
        subject: &SubjectId,
        action: &Action,
    ) -> Result<bool> {
        self.inner.delete_grant(resource, subject, action).await
    }

    async fn health_check(&self) -> Result<()> {
        std::future::pending().await
    }

    fn name(&self) -> &'static str {
        "hanging"
    }
}
