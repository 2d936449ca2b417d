//! Permcache Core - resource permission cache
//!
//! Answers "can subject S perform action A on resource R" with low latency
//! while staying consistent with an authoritative grant store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Authorization Facade                        │
//! │          (callers; see facade::Authorizer)                   │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ has_permission
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │                PermissionCacheManager                        │
//! │                                                              │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐      │
//! │  │  Key slots  │  │   Expiry    │  │  Maintenance    │      │
//! │  │ (generation │  │  (base TTL  │  │  (purge, prune) │      │
//! │  │  + gate)    │  │  + jitter)  │  │                 │      │
//! │  └─────────────┘  └─────────────┘  └─────────────────┘      │
//! │         │                                                    │
//! │  ┌──────▼──────────────┐        ┌─────────────────────┐     │
//! │  │   CacheBackend      │        │  PermissionStore    │     │
//! │  │  (MemoryCache, ...) │        │ (InMemory, File...) │     │
//! │  └─────────────────────┘        └─────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use permcache_core::{
//!     Action, InMemoryStore, ManagerConfig, PermissionCacheManager, ResourceRef, SubjectId,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = Arc::new(InMemoryStore::new());
//! let manager = PermissionCacheManager::with_memory_cache(store, ManagerConfig::default()).unwrap();
//!
//! let device = ResourceRef::device(7).unwrap();
//! let user = SubjectId::new("42").unwrap();
//! let read = Action::new("READ").unwrap();
//!
//! manager.grant_permission(&device, &user, &read).await.unwrap();
//! assert!(manager.has_permission(&user, &device, &read).await.unwrap());
//!
//! manager.revoke_permission(&device, &user, &read).await.unwrap();
//! assert!(!manager.has_permission(&user, &device, &read).await.unwrap());
//! # });
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod facade;
pub mod grant;
pub mod keys;
pub mod maintenance;
pub mod manager;
pub mod store;

pub use cache::{CacheBackend, CacheEntry, CacheStats, ExpiryPolicy, MemoryCache};
pub use config::{CacheConfig, MaintenanceConfig, ManagerConfig, StoreConfig};
pub use error::{ErrorCategory, PermCacheError, Result};
pub use facade::{authorize, Authorizer, OnStoreFailure};
pub use grant::{Action, PermissionGrant, ResourcePermissionSet, ResourceRef, SubjectId};
pub use maintenance::MaintenanceHandle;
pub use manager::{MaintenanceReport, ManagerStats, PermissionCacheManager};
pub use store::{FileStore, InMemoryStore, PermissionStore};
