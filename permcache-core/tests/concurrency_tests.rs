//! Concurrency tests: invalidation races, coalescing, per-key isolation

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{action, device, manager_over, patient_config, subject, GatedStore, HangingStore};
use permcache_core::{InMemoryStore, ManagerConfig, PermissionCacheManager, PermissionStore};

#[tokio::test]
async fn test_population_raced_by_grant_is_discarded() {
    let store = Arc::new(GatedStore::new());
    let manager = Arc::new(manager_over(store.clone(), patient_config()));
    let (r, u, a) = (device(7), subject("42"), action("READ"));

    store.hold(&r);
    let reader = {
        let manager = Arc::clone(&manager);
        let (r, u, a) = (r.clone(), u.clone(), a.clone());
        tokio::spawn(async move { manager.has_permission(&u, &r, &a).await })
    };

    // The reader has its (empty) snapshot; now a grant lands and invalidates
    store.wait_entered().await;
    manager.grant_permission(&r, &u, &a).await.unwrap();
    store.release();

    // The in-flight read answers from its older snapshot...
    assert!(!reader.await.unwrap().unwrap());
    // ...but must not have cached it
    assert_eq!(manager.stats().discarded_populations, 1);
    assert_eq!(manager.stats().cache.entry_count, 0);

    assert!(manager.has_permission(&u, &r, &a).await.unwrap());
}

#[tokio::test]
async fn test_population_raced_by_revoke_is_discarded() {
    let store = Arc::new(GatedStore::new());
    let manager = Arc::new(manager_over(store.clone(), patient_config()));
    let (r, u, a) = (device(7), subject("42"), action("READ"));
    manager.grant_permission(&r, &u, &a).await.unwrap();

    store.hold(&r);
    let reader = {
        let manager = Arc::clone(&manager);
        let (r, u, a) = (r.clone(), u.clone(), a.clone());
        tokio::spawn(async move { manager.has_permission(&u, &r, &a).await })
    };

    store.wait_entered().await;
    manager.revoke_permission(&r, &u, &a).await.unwrap();
    store.release();

    assert!(reader.await.unwrap().unwrap());
    assert_eq!(manager.stats().discarded_populations, 1);

    // The revoke wins: no stale "allowed" was left behind
    assert!(!manager.has_permission(&u, &r, &a).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_misses_share_one_load() {
    let store = Arc::new(GatedStore::new());
    let manager = Arc::new(manager_over(store.clone(), patient_config()));
    let (r, u, a) = (device(7), subject("42"), action("READ"));
    store
        .inner
        .insert_grant(&permcache_core::PermissionGrant::new(r.clone(), u.clone(), a.clone()))
        .await
        .unwrap();

    store.hold(&r);
    let mut readers = Vec::new();
    for _ in 0..10 {
        let manager = Arc::clone(&manager);
        let (r, u, a) = (r.clone(), u.clone(), a.clone());
        readers.push(tokio::spawn(async move {
            manager.has_permission(&u, &r, &a).await
        }));
    }

    store.wait_entered().await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    store.release();

    for reader in readers {
        assert!(reader.await.unwrap().unwrap());
    }

    assert_eq!(store.inner.select_count(), 1);
    let stats = manager.stats();
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.cache_hits + stats.coalesced_loads, 9);
}

#[tokio::test(start_paused = true)]
async fn test_failed_load_is_shared_with_queued_callers() {
    let store = Arc::new(HangingStore {
        inner: InMemoryStore::new(),
    });
    let timeout = Duration::from_millis(100);
    let manager = Arc::new(manager_over(
        store,
        ManagerConfig::default().with_store_timeout(timeout),
    ));

    let started = tokio::time::Instant::now();
    let mut readers = Vec::new();
    for _ in 0..10 {
        let manager = Arc::clone(&manager);
        readers.push(tokio::spawn(async move {
            manager
                .has_permission(&subject("42"), &device(7), &action("READ"))
                .await
        }));
    }
    for reader in readers {
        let err = reader.await.unwrap().unwrap_err();
        assert!(err.is_store_unavailable());
    }

    // One timeout for everyone, not one per queued caller
    assert!(started.elapsed() < timeout * 2, "took {:?}", started.elapsed());
    let stats = manager.stats();
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.load_failures, 1);
    assert_eq!(stats.coalesced_loads, 9);
}

#[tokio::test]
async fn test_caller_after_failed_load_retries_the_store() {
    let store = Arc::new(InMemoryStore::new());
    let manager = manager_over(store.clone(), ManagerConfig::default());
    let (r, u, a) = (device(7), subject("42"), action("READ"));

    store.set_available(false);
    assert!(manager.has_permission(&u, &r, &a).await.is_err());

    // The earlier failure is not replayed to a fresh caller
    store.set_available(true);
    assert!(!manager.has_permission(&u, &r, &a).await.unwrap());
    assert_eq!(store.select_count(), 2);
}

#[tokio::test]
async fn test_slow_load_does_not_block_other_resources() {
    let store = Arc::new(GatedStore::new());
    let manager = Arc::new(manager_over(store.clone(), patient_config()));
    let a = action("READ");

    store.hold(&device(1));
    let blocked = {
        let manager = Arc::clone(&manager);
        let a = a.clone();
        tokio::spawn(async move { manager.has_permission(&subject("42"), &device(1), &a).await })
    };
    store.wait_entered().await;

    // device:1 is parked inside the store; device:2 must still answer.
    // Writes on device:1 also proceed: they never take the load gate.
    let other = tokio::time::timeout(
        Duration::from_secs(5),
        manager.has_permission(&subject("42"), &device(2), &a),
    )
    .await
    .expect("unrelated resource blocked by in-flight load");
    assert!(!other.unwrap());

    tokio::time::timeout(
        Duration::from_secs(5),
        manager.grant_permission(&device(1), &subject("7"), &a),
    )
    .await
    .expect("write blocked by in-flight load")
    .unwrap();

    store.release();
    blocked.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_and_reads_converge() {
    let store = Arc::new(InMemoryStore::new());
    let manager: Arc<PermissionCacheManager> =
        Arc::new(manager_over(store.clone(), ManagerConfig::default()));
    let r = device(7);
    let a = action("READ");

    let mut tasks = Vec::new();
    for writer in 0..8u32 {
        let manager = Arc::clone(&manager);
        let (r, a) = (r.clone(), a.clone());
        tasks.push(tokio::spawn(async move {
            let u = subject(&format!("user{}", writer));
            for round in 0..20 {
                if round % 2 == 0 || writer % 2 == 0 {
                    manager.grant_permission(&r, &u, &a).await.unwrap();
                } else {
                    manager.revoke_permission(&r, &u, &a).await.unwrap();
                }
            }
        }));
    }
    for reader in 0..8u32 {
        let manager = Arc::clone(&manager);
        let (r, a) = (r.clone(), a.clone());
        tasks.push(tokio::spawn(async move {
            let u = subject(&format!("user{}", reader));
            for _ in 0..50 {
                manager.has_permission(&u, &r, &a).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Once writes have settled the cache agrees with the store for everyone.
    // Even writers end on a grant; odd writers end on a revoke.
    let grants = store.select_grants(&r).await.unwrap();
    for writer in 0..8u32 {
        let u = subject(&format!("user{}", writer));
        let in_store = grants.iter().any(|g| g.subject == u);
        assert_eq!(in_store, writer % 2 == 0);
        assert_eq!(manager.has_permission(&u, &r, &a).await.unwrap(), in_store);
    }
}
