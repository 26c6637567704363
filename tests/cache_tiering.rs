//! End-to-end scenarios for the tiered cache: round trips, TTL expiry,
//! degraded tiers and bulk purges.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{ClockedStore, FailingBackend, FailingStore};
use contentpilot_cache::backend::MemoryBackend;
use contentpilot_cache::store::SqliteStore;
use contentpilot_cache::CacheManager;

async fn sqlite_manager() -> CacheManager {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    CacheManager::new(
        Some(Arc::new(MemoryBackend::new())),
        store,
        None,
        "itest",
        3600,
    )
}

#[tokio::test]
async fn set_then_get_round_trips_through_the_stack() {
    let cache = sqlite_manager().await;
    assert!(cache
        .set("article:42", &serde_json::json!({"title": "hello"}), Some(120))
        .await
        .unwrap());
    let got: Option<serde_json::Value> = cache.get("article:42").await.unwrap();
    assert_eq!(got, Some(serde_json::json!({"title": "hello"})));
}

#[tokio::test]
async fn entries_expire_after_their_ttl() {
    let store = Arc::new(ClockedStore::new());
    let cache = CacheManager::new(None, store.clone(), None, "itest", 3600);

    assert!(cache.set("short-lived", &1u64, Some(120)).await.unwrap());
    assert_eq!(cache.get::<u64>("short-lived").await.unwrap(), Some(1));

    store.advance(121);
    assert_eq!(cache.get::<u64>("short-lived").await.unwrap(), None);
    assert_eq!(cache.get_or("short-lived", 99u64).await.unwrap(), 99);
}

#[tokio::test]
async fn write_back_never_outlives_the_persistent_row() {
    let fast = Arc::new(MemoryBackend::new());
    let store = Arc::new(ClockedStore::new());
    let cache = CacheManager::new(Some(fast.clone()), store.clone(), None, "itest", 3600);

    cache.set("feed", &7u64, Some(120)).await.unwrap();
    // Almost the whole row lifetime elapses before the fast copy is lost.
    store.advance(119);
    use contentpilot_cache::backend::BackendAdapter;
    fast.delete("itest:feed").await.unwrap();

    // The read falls through and repopulates with the row's remaining ~1s,
    // not the 3600s default.
    assert_eq!(cache.get::<u64>("feed").await.unwrap(), Some(7));
    assert!(fast.get("itest:feed").await.unwrap().is_some());
    tokio::time::sleep(std::time::Duration::from_millis(1_200)).await;
    assert_eq!(fast.get("itest:feed").await.unwrap(), None);
}

#[tokio::test]
async fn fast_tier_outage_degrades_to_persistent() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let cache = CacheManager::new(Some(Arc::new(FailingBackend)), store, None, "itest", 3600);

    assert!(cache.set("resilient", &"still here".to_string(), Some(60)).await.unwrap());
    let got: Option<String> = cache.get("resilient").await.unwrap();
    assert_eq!(got, Some("still here".to_string()));
    assert!(cache.delete("resilient").await.unwrap());

    let stats = cache.stats().await;
    assert!(stats.degraded_ops > 0);
    assert_eq!(stats.persistent_hits, 1);
}

#[tokio::test]
async fn total_outage_returns_defaults_not_errors() {
    let cache = CacheManager::new(
        Some(Arc::new(FailingBackend)),
        Arc::new(FailingStore),
        None,
        "itest",
        3600,
    );

    assert_eq!(cache.get_or("anything", 5u64).await.unwrap(), 5);
    assert!(!cache.set("anything", &1u64, Some(60)).await.unwrap());
    assert!(!cache.delete("anything").await.unwrap());
    assert_eq!(cache.purge_all().await.unwrap(), 0);
}

#[tokio::test]
async fn purge_by_prefix_empties_the_group() {
    let cache = sqlite_manager().await;
    cache.set("ns:a", &1u64, Some(60)).await.unwrap();
    cache.set("ns:b", &2u64, Some(60)).await.unwrap();
    cache.set("other", &3u64, Some(60)).await.unwrap();

    assert_eq!(cache.purge_prefix("ns:").await.unwrap(), 2);
    assert_eq!(cache.get_or("ns:a", 0u64).await.unwrap(), 0);
    assert_eq!(cache.get_or("ns:b", 0u64).await.unwrap(), 0);
    assert_eq!(cache.get_or("other", 0u64).await.unwrap(), 3);
}

#[tokio::test]
async fn namespaces_isolate_identical_keys() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let blog = CacheManager::new(None, store.clone(), None, "blog", 3600);
    let jobs = CacheManager::new(None, store, None, "jobs", 3600);

    blog.set("settings", &"blog-value".to_string(), Some(60)).await.unwrap();
    jobs.set("settings", &"jobs-value".to_string(), Some(60)).await.unwrap();

    assert_eq!(
        blog.get::<String>("settings").await.unwrap(),
        Some("blog-value".to_string())
    );
    assert_eq!(
        jobs.get::<String>("settings").await.unwrap(),
        Some("jobs-value".to_string())
    );

    // Purging one namespace leaves the other intact.
    assert_eq!(blog.purge_all().await.unwrap(), 1);
    assert_eq!(
        jobs.get::<String>("settings").await.unwrap(),
        Some("jobs-value".to_string())
    );
}

#[tokio::test]
async fn overwrites_replace_the_visible_value() {
    let cache = sqlite_manager().await;
    cache.set("k", &"first".to_string(), Some(60)).await.unwrap();
    cache.set("k", &"second".to_string(), Some(60)).await.unwrap();
    assert_eq!(
        cache.get::<String>("k").await.unwrap(),
        Some("second".to_string())
    );
}
