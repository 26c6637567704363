//! Test doubles shared by the integration scenarios: a persistent store
//! with a controllable clock, and a fast-tier adapter that simulates an
//! outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use contentpilot_cache::backend::{BackendAdapter, BackendKind, BackendTelemetry};
use contentpilot_cache::error::{CacheError, Result};
use contentpilot_cache::store::PersistentStore;

/// In-memory option table with a test-controlled clock, so window expiry is
/// simulated by advancing time instead of sleeping through real TTLs.
#[derive(Default)]
pub struct ClockedStore {
    rows: Mutex<HashMap<String, (String, i64)>>,
    now: AtomicI64,
}

impl ClockedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistentStore for ClockedStore {
    async fn get(&self, key: &str) -> Result<Option<(String, u64)>> {
        let now = self.now();
        let rows = self.rows.lock().unwrap();
        match rows.get(key) {
            Some((value, expires_at)) if *expires_at > now => {
                Ok(Some((value.clone(), (*expires_at - now) as u64)))
            }
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let expires_at = self.now() + ttl_secs as i64;
        self.rows
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.now();
        match self.rows.lock().unwrap().remove(key) {
            Some((_, expires_at)) => Ok(expires_at > now),
            None => Ok(false),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|key, _| !key.starts_with(prefix));
        Ok((before - rows.len()) as u64)
    }

    async fn entry_count(&self) -> Result<u64> {
        let now = self.now();
        let rows = self.rows.lock().unwrap();
        Ok(rows.values().filter(|(_, expires_at)| *expires_at > now).count() as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Persistent store where every call fails, for total-outage scenarios.
pub struct FailingStore;

#[async_trait]
impl PersistentStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<(String, u64)>> {
        Err(CacheError::Storage("simulated database outage".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<()> {
        Err(CacheError::Storage("simulated database outage".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(CacheError::Storage("simulated database outage".to_string()))
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<u64> {
        Err(CacheError::Storage("simulated database outage".to_string()))
    }

    async fn entry_count(&self) -> Result<u64> {
        Err(CacheError::Storage("simulated database outage".to_string()))
    }

    async fn ping(&self) -> Result<()> {
        Err(CacheError::Storage("simulated database outage".to_string()))
    }
}

/// Fast-tier adapter where every call fails, as if the store went away
/// after selection.
pub struct FailingBackend;

#[async_trait]
impl BackendAdapter for FailingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(CacheError::BackendUnavailable("simulated outage".to_string()))
    }

    async fn set_with_expiry(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<()> {
        Err(CacheError::BackendUnavailable("simulated outage".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(CacheError::BackendUnavailable("simulated outage".to_string()))
    }

    async fn increment(&self, _key: &str, _by: u64, _ttl_secs: u64) -> Result<u64> {
        Err(CacheError::BackendUnavailable("simulated outage".to_string()))
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<u64> {
        Err(CacheError::BackendUnavailable("simulated outage".to_string()))
    }

    async fn ping(&self) -> Result<()> {
        Err(CacheError::BackendUnavailable("simulated outage".to_string()))
    }

    async fn entry_count(&self) -> Result<u64> {
        Err(CacheError::BackendUnavailable("simulated outage".to_string()))
    }

    async fn telemetry(&self) -> Result<BackendTelemetry> {
        Err(CacheError::BackendUnavailable("simulated outage".to_string()))
    }
}
