// src/backend/memory.rs
//! Embedded in-process adapter.
//!
//! Serves single-process deployments with no external store and gives tests
//! a deterministic fast tier. Increments are exact: the map's per-key entry
//! lock makes read-modify-write atomic.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::backend::{BackendAdapter, BackendKind, BackendTelemetry};
use crate::error::{CacheError, Result};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    map: DashMap<String, Entry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackendAdapter for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.map.get(key) {
            if !entry.expired(Instant::now()) {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.map
            .remove_if(key, |_, entry| entry.expired(Instant::now()));
        Ok(None)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match self.map.remove(key) {
            Some((_, entry)) => Ok(!entry.expired(Instant::now())),
            None => Ok(false),
        }
    }

    async fn increment(&self, key: &str, by: u64, ttl_secs: u64) -> Result<u64> {
        let now = Instant::now();
        let mut entry = self.map.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: now + Duration::from_secs(ttl_secs),
        });
        if entry.expired(now) {
            // Window elapsed: the next attempt starts a fresh window.
            entry.value = "0".to_string();
            entry.expires_at = now + Duration::from_secs(ttl_secs);
        }
        let current: u64 = entry.value.parse().map_err(|_| {
            CacheError::OperationFailed(format!("counter key holds a non-integer value: {}", key))
        })?;
        let next = current.saturating_add(by);
        entry.value = next.to_string();
        Ok(next)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let before = self.map.len() as u64;
        self.map.retain(|key, _| !key.starts_with(prefix));
        Ok(before.saturating_sub(self.map.len() as u64))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn entry_count(&self) -> Result<u64> {
        let now = Instant::now();
        let live = self
            .map
            .iter()
            .filter(|entry| !entry.value().expired(now))
            .count();
        Ok(live as u64)
    }

    async fn telemetry(&self) -> Result<BackendTelemetry> {
        Ok(BackendTelemetry::default())
    }
}
