//! End-to-end scenarios for the rate limiter: fixed-window reset, tier
//! degradation, the permissive failure mode and log anonymization.

mod common;

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use common::{ClockedStore, FailingBackend, FailingStore};
use contentpilot_cache::backend::MemoryBackend;
use contentpilot_cache::rate_limit::anonymize;
use contentpilot_cache::store::SqliteStore;
use contentpilot_cache::{CacheManager, RateLimiter};

fn limiter_over(store: Arc<ClockedStore>) -> RateLimiter {
    let cache = Arc::new(CacheManager::new(None, store, None, "itest", 3600));
    RateLimiter::new(cache)
}

#[tokio::test]
async fn fixed_window_counts_then_resets() {
    let store = Arc::new(ClockedStore::new());
    let limiter = limiter_over(store.clone());

    assert_eq!(limiter.record_attempt("publish", 60, "203.0.113.7").await.unwrap(), 1);
    assert_eq!(limiter.record_attempt("publish", 60, "203.0.113.7").await.unwrap(), 2);
    assert_eq!(limiter.record_attempt("publish", 60, "203.0.113.7").await.unwrap(), 3);
    assert!(limiter
        .is_rate_limited("publish", 3, 60, "203.0.113.7")
        .await
        .unwrap());

    // Once the window elapses the counter expires and a fresh window opens.
    store.advance(61);
    assert!(!limiter
        .is_rate_limited("publish", 3, 60, "203.0.113.7")
        .await
        .unwrap());
    assert_eq!(limiter.record_attempt("publish", 60, "203.0.113.7").await.unwrap(), 1);
}

#[tokio::test]
async fn check_then_act_pair_gates_the_caller() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let cache = Arc::new(CacheManager::new(
        Some(Arc::new(MemoryBackend::new())),
        store,
        None,
        "itest",
        3600,
    ));
    let limiter = RateLimiter::new(cache);

    // The calling pattern from the content pipeline: check, act, record.
    let mut performed = 0;
    for _ in 0..5 {
        if limiter.is_rate_limited("fetch", 3, 60, "worker-1").await.unwrap() {
            continue;
        }
        performed += 1;
        limiter.record_attempt("fetch", 60, "worker-1").await.unwrap();
    }
    assert_eq!(performed, 3);
}

#[tokio::test]
async fn fast_tier_outage_falls_back_to_approximate_counting() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let cache = Arc::new(CacheManager::new(
        Some(Arc::new(FailingBackend)),
        store,
        None,
        "itest",
        3600,
    ));
    let limiter = RateLimiter::new(cache);

    assert_eq!(limiter.record_attempt("publish", 60, "id").await.unwrap(), 1);
    assert_eq!(limiter.record_attempt("publish", 60, "id").await.unwrap(), 2);
    assert!(limiter.is_rate_limited("publish", 2, 60, "id").await.unwrap());

    let stats = limiter.stats();
    assert_eq!(stats.fast_increments, 0);
    assert_eq!(stats.fallback_increments, 2);
    assert_eq!(stats.permissive_failures, 0);
}

#[tokio::test]
async fn total_outage_is_permissive() {
    let cache = Arc::new(CacheManager::new(
        Some(Arc::new(FailingBackend)),
        Arc::new(FailingStore),
        None,
        "itest",
        3600,
    ));
    let limiter = RateLimiter::new(cache);

    // Every attempt reads as the first of a window; callers are never blocked.
    assert_eq!(limiter.record_attempt("publish", 60, "id").await.unwrap(), 1);
    assert_eq!(limiter.record_attempt("publish", 60, "id").await.unwrap(), 1);
    assert!(!limiter.is_rate_limited("publish", 1, 60, "id").await.unwrap());
    assert!(limiter.stats().permissive_failures >= 2);
}

#[tokio::test]
async fn windows_are_scoped_per_action_and_identifier() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let cache = Arc::new(CacheManager::new(
        Some(Arc::new(MemoryBackend::new())),
        store,
        None,
        "itest",
        3600,
    ));
    let limiter = RateLimiter::new(cache);

    limiter.record_attempt("publish", 60, "a").await.unwrap();
    limiter.record_attempt("publish", 60, "a").await.unwrap();
    assert!(limiter.is_rate_limited("publish", 2, 60, "a").await.unwrap());
    assert!(!limiter.is_rate_limited("publish", 2, 60, "b").await.unwrap());
    assert!(!limiter.is_rate_limited("humanize", 2, 60, "a").await.unwrap());
}

/// Captures everything the subsystem logs so tests can assert on it.
struct CaptureLogger {
    lines: Mutex<Vec<String>>,
}

static CAPTURE: CaptureLogger = CaptureLogger {
    lines: Mutex::new(Vec::new()),
};

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("{}", record.args()));
    }

    fn flush(&self) {}
}

#[tokio::test]
async fn identifiers_never_reach_logs_raw() {
    let _ = log::set_logger(&CAPTURE);
    log::set_max_level(log::LevelFilter::Debug);

    let cache = Arc::new(CacheManager::new(
        Some(Arc::new(FailingBackend)),
        Arc::new(FailingStore),
        None,
        "itest",
        3600,
    ));
    let limiter = RateLimiter::new(cache);

    // Drive the paths that mention the identifier: a permissive failure and
    // a tripped limit.
    limiter.record_attempt("publish", 60, "203.0.113.7").await.unwrap();
    let _ = limiter.is_rate_limited("publish", 1, 60, "203.0.113.7").await;

    let lines = CAPTURE.lines.lock().unwrap();
    assert!(!lines.is_empty());
    for line in lines.iter() {
        assert!(
            !line.contains("203.0.113.7"),
            "raw identifier leaked into log line: {}",
            line
        );
    }
}

#[test]
fn anonymize_output_is_opaque_and_stable() {
    let anon = anonymize("203.0.113.7");
    assert!(!anon.contains("203.0.113.7"));
    assert_eq!(anon, anonymize("203.0.113.7"));
}
