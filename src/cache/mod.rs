// src/cache/mod.rs
//! Tiered cache manager.
//!
//! Composes zero or one fast [`BackendAdapter`] with a persistent fallback
//! store into one logical cache: tiered reads with write-back repopulation,
//! write-through writes, and namespace-scoped bulk purges. No tier is a
//! single point of failure; every backend error is absorbed and logged, and
//! only caller-input errors (bad key, bad TTL, unserializable value) surface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};

use crate::backend::{select_backend, BackendAdapter, BackendKind, BackendTelemetry};
use crate::config::Config;
use crate::constants::MAX_KEY_LEN;
use crate::error::{CacheError, Result};
use crate::store::{PersistentStore, SqliteStore};
use crate::utils::truncate_msg;

pub mod edge;

pub use edge::EdgePurger;

pub struct CacheManager {
    fast: Option<Arc<dyn BackendAdapter>>,
    store: Arc<dyn PersistentStore>,
    edge: Option<EdgePurger>,
    namespace: String,
    default_ttl_secs: u64,
    counters: Counters,
}

#[derive(Default)]
struct Counters {
    fast_hits: AtomicU64,
    persistent_hits: AtomicU64,
    misses: AtomicU64,
    write_backs: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    degraded_ops: AtomicU64,
}

impl CacheManager {
    pub fn new(
        fast: Option<Arc<dyn BackendAdapter>>,
        store: Arc<dyn PersistentStore>,
        edge: Option<EdgePurger>,
        namespace: &str,
        default_ttl_secs: u64,
    ) -> Self {
        Self {
            fast,
            store,
            edge,
            namespace: namespace.to_string(),
            default_ttl_secs,
            counters: Counters::default(),
        }
    }

    /// Builds the full stack from configuration: fast-tier selection,
    /// persistent store and edge purge hooks.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let fast = select_backend(config).await;
        let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
        let edge = EdgePurger::new(&config.edge_purge_urls, config.backend_timeout());
        Ok(Self::new(
            fast,
            store,
            edge,
            &config.namespace,
            config.default_ttl_secs,
        ))
    }

    pub fn fast_backend(&self) -> Option<BackendKind> {
        self.fast.as_ref().map(|fast| fast.kind())
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl_secs
    }

    /// Reads through the tiers: fast first, then persistent. A persistent
    /// hit repopulates the fast tier so subsequent reads are fast.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let full = self.namespaced(key)?;

        if let Some(fast) = &self.fast {
            match fast.get(&full).await {
                Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                    Ok(value) => {
                        self.counters.fast_hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(Some(value));
                    }
                    Err(e) => {
                        warn!(
                            "Discarding undecodable fast-tier entry for '{}': {}",
                            full,
                            truncate_msg(&e.to_string(), 120)
                        );
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    self.counters.degraded_ops.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Fast-tier get failed for '{}', falling back: {}",
                        full,
                        truncate_msg(&e.to_string(), 120)
                    );
                }
            }
        }

        match self.store.get(&full).await {
            Ok(Some((raw, remaining_ttl))) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    self.counters.persistent_hits.fetch_add(1, Ordering::Relaxed);
                    self.write_back(&full, &raw, remaining_ttl).await;
                    return Ok(Some(value));
                }
                Err(e) => {
                    warn!(
                        "Discarding undecodable persistent entry for '{}': {}",
                        full,
                        truncate_msg(&e.to_string(), 120)
                    );
                }
            },
            Ok(None) => {}
            Err(e) => {
                self.counters.degraded_ops.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Persistent-tier get failed for '{}': {}",
                    full,
                    truncate_msg(&e.to_string(), 120)
                );
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    /// [`CacheManager::get`] with a caller-supplied default for misses and
    /// tier failures.
    pub async fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Write-through to both tiers. Returns `Ok(true)` only when the
    /// persistent write succeeded; a fast-tier failure is logged and does
    /// not fail the call.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: Option<u64>) -> Result<bool> {
        let full = self.namespaced(key)?;
        let ttl = self.resolve_ttl(ttl_secs)?;
        let raw = serde_json::to_string(value)?;
        self.counters.sets.fetch_add(1, Ordering::Relaxed);

        let persisted = match self.store.set(&full, &raw, ttl).await {
            Ok(()) => true,
            Err(e) => {
                self.counters.degraded_ops.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Persistent-tier set failed for '{}': {}",
                    full,
                    truncate_msg(&e.to_string(), 120)
                );
                false
            }
        };

        if let Some(fast) = &self.fast {
            if let Err(e) = fast.set_with_expiry(&full, &raw, ttl).await {
                self.counters.degraded_ops.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Fast-tier set failed for '{}' (persistent write stands): {}",
                    full,
                    truncate_msg(&e.to_string(), 120)
                );
            }
        }

        Ok(persisted)
    }

    /// Deletes from both tiers; the persistent result decides the outcome.
    /// A fast-tier deletion failure leaves a stale entry that will be
    /// overwritten or expire.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let full = self.namespaced(key)?;
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);

        if let Some(fast) = &self.fast {
            if let Err(e) = fast.delete(&full).await {
                warn!(
                    "Fast-tier delete failed for '{}', entry left to expire: {}",
                    full,
                    truncate_msg(&e.to_string(), 120)
                );
            }
        }

        match self.store.delete(&full).await {
            Ok(existed) => Ok(existed),
            Err(e) => {
                self.counters.degraded_ops.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Persistent-tier delete failed for '{}': {}",
                    full,
                    truncate_msg(&e.to_string(), 120)
                );
                Ok(false)
            }
        }
    }

    /// Atomic counter bump on the fast tier; `Err` when no fast tier is
    /// active or the operation fails. Counter semantics (TTL anchoring the
    /// window) are the backend's.
    pub async fn increment_fast(&self, key: &str, by: u64, ttl_secs: u64) -> Result<u64> {
        let full = self.namespaced(key)?;
        let fast = self.fast.as_ref().ok_or_else(|| {
            CacheError::BackendUnavailable("no fast-tier backend active".to_string())
        })?;
        fast.increment(&full, by, ttl_secs).await
    }

    /// Reads a counter through the tiers without the write-back a normal
    /// `get` performs; repopulating a counter would detach its expiry from
    /// the window that created it. Missing counters read as zero.
    pub async fn read_counter(&self, key: &str) -> Result<u64> {
        let full = self.namespaced(key)?;
        if let Some(fast) = &self.fast {
            match fast.get(&full).await {
                Ok(Some(raw)) => {
                    if let Ok(count) = raw.trim().parse::<u64>() {
                        return Ok(count);
                    }
                    warn!("Discarding non-integer counter in fast tier for '{}'", full);
                }
                Ok(None) => {}
                Err(e) => {
                    self.counters.degraded_ops.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Fast-tier counter read failed for '{}', falling back: {}",
                        full,
                        truncate_msg(&e.to_string(), 120)
                    );
                }
            }
        }
        Ok(self.read_persistent_counter_raw(&full).await)
    }

    /// Reads a counter from the persistent tier only. The rate limiter's
    /// fallback path uses this so a failing fast tier cannot serve stale
    /// counts.
    pub async fn read_persistent_counter(&self, key: &str) -> Result<u64> {
        let full = self.namespaced(key)?;
        Ok(self.read_persistent_counter_raw(&full).await)
    }

    async fn read_persistent_counter_raw(&self, full_key: &str) -> u64 {
        match self.store.get(full_key).await {
            Ok(Some((raw, _))) => raw.trim().parse::<u64>().unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                self.counters.degraded_ops.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Persistent-tier counter read failed for '{}': {}",
                    full_key,
                    truncate_msg(&e.to_string(), 120)
                );
                0
            }
        }
    }

    /// Writes a raw counter value through the persistent tier. Used by the
    /// rate limiter's read-then-write fallback; not atomic under concurrent
    /// writers.
    pub async fn set_persistent_counter(&self, key: &str, value: u64, ttl_secs: u64) -> Result<()> {
        let full = self.namespaced(key)?;
        self.store.set(&full, &value.to_string(), ttl_secs).await
    }

    /// Removes every entry under `prefix` (within the namespace) from the
    /// persistent tier, and from the fast tier where the backend supports
    /// pattern deletion. Returns the persistent rows removed.
    pub async fn purge_prefix(&self, prefix: &str) -> Result<u64> {
        validate_prefix(prefix)?;
        let full = format!("{}:{}", self.namespace, prefix);

        let removed = match self.store.delete_prefix(&full).await {
            Ok(count) => count,
            Err(e) => {
                self.counters.degraded_ops.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Persistent-tier purge failed for prefix '{}': {}",
                    full,
                    truncate_msg(&e.to_string(), 120)
                );
                0
            }
        };

        if let Some(fast) = &self.fast {
            match fast.delete_prefix(&full).await {
                Ok(count) => debug!("Fast-tier purge removed {} keys under '{}'", count, full),
                Err(e) => warn!(
                    "Fast-tier purge failed for prefix '{}', entries left to expire: {}",
                    full,
                    truncate_msg(&e.to_string(), 120)
                ),
            }
        }

        Ok(removed)
    }

    /// Purges the whole namespace, then fires the configured edge-cache
    /// purge hooks best-effort.
    pub async fn purge_all(&self) -> Result<u64> {
        let removed = self.purge_prefix("").await?;
        if let Some(edge) = &self.edge {
            edge.purge_all().await;
        }
        Ok(removed)
    }

    /// Read-only operational snapshot.
    pub async fn stats(&self) -> CacheStats {
        let (fast_entries, fast_telemetry) = match &self.fast {
            Some(fast) => (
                fast.entry_count().await.ok(),
                fast.telemetry().await.ok(),
            ),
            None => (None, None),
        };
        CacheStats {
            backend: self.fast_backend(),
            fast_entries,
            fast_telemetry,
            persistent_entries: self.store.entry_count().await.ok(),
            fast_hits: self.counters.fast_hits.load(Ordering::Relaxed),
            persistent_hits: self.counters.persistent_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            write_backs: self.counters.write_backs.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            degraded_ops: self.counters.degraded_ops.load(Ordering::Relaxed),
        }
    }

    async fn write_back(&self, full_key: &str, raw: &str, remaining_ttl: u64) {
        let Some(fast) = &self.fast else {
            return;
        };
        // The repopulated copy must not outlive the persistent row.
        let ttl = remaining_ttl.min(self.default_ttl_secs).max(1);
        match fast.set_with_expiry(full_key, raw, ttl).await {
            Ok(()) => {
                self.counters.write_backs.fetch_add(1, Ordering::Relaxed);
                debug!("Repopulated fast tier for '{}'", full_key);
            }
            Err(e) => warn!(
                "Fast-tier write-back failed for '{}': {}",
                full_key,
                truncate_msg(&e.to_string(), 120)
            ),
        }
    }

    fn resolve_ttl(&self, ttl_secs: Option<u64>) -> Result<u64> {
        match ttl_secs {
            Some(0) => Err(CacheError::Validation(
                "TTL must be greater than zero".to_string(),
            )),
            Some(ttl) => Ok(ttl),
            None => Ok(self.default_ttl_secs),
        }
    }

    fn namespaced(&self, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(CacheError::Validation("cache key cannot be empty".to_string()));
        }
        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CacheError::Validation(format!(
                "cache key contains whitespace or control characters ({} bytes)",
                key.len()
            )));
        }
        let full = format!("{}:{}", self.namespace, key);
        if full.len() > MAX_KEY_LEN {
            return Err(CacheError::Validation(format!(
                "cache key exceeds {} bytes after namespacing",
                MAX_KEY_LEN
            )));
        }
        Ok(full)
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CacheError::Validation(
            "purge prefix contains whitespace or control characters".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    #[serde(serialize_with = "serialize_backend")]
    pub backend: Option<BackendKind>,
    pub fast_entries: Option<u64>,
    pub fast_telemetry: Option<BackendTelemetry>,
    pub persistent_entries: Option<u64>,
    pub fast_hits: u64,
    pub persistent_hits: u64,
    pub misses: u64,
    pub write_backs: u64,
    pub sets: u64,
    pub deletes: u64,
    pub degraded_ops: u64,
}

fn serialize_backend<S: Serializer>(
    backend: &Option<BackendKind>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match backend {
        Some(kind) => serializer.serialize_str(&kind.to_string()),
        None => serializer.serialize_str("none"),
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cache: backend={} fast_entries={:?} persistent_entries={:?} hits={}+{} misses={} write_backs={} degraded={}",
            self.backend
                .map(|kind| kind.to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.fast_entries,
            self.persistent_entries,
            self.fast_hits,
            self.persistent_hits,
            self.misses,
            self.write_backs,
            self.degraded_ops,
        )
    }
}
