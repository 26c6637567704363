// src/backend/memcached.rs
//! Memcached adapter, the distributed object-cache family.
//!
//! The `memcache` client is synchronous; calls run on the blocking pool and
//! are bounded by the shared per-call deadline. The protocol has no pattern
//! deletion, so prefix purges report zero and entries age out via TTL.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::backend::{with_deadline, BackendAdapter, BackendKind, BackendTelemetry};
use crate::error::{CacheError, Result};

#[derive(Clone)]
pub struct MemcachedBackend {
    client: Arc<memcache::Client>,
    deadline: Duration,
    url: String,
}

impl fmt::Debug for MemcachedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemcachedBackend")
            .field("url", &self.url)
            .field("deadline", &self.deadline)
            .field("client", &"<memcache::Client instance>")
            .finish()
    }
}

impl MemcachedBackend {
    pub async fn connect(url: &str, deadline: Duration) -> Result<Self> {
        let owned_url = url.to_string();
        let client = with_deadline(deadline, "memcached connect", async move {
            tokio::task::spawn_blocking(move || memcache::Client::connect(owned_url.as_str()))
                .await
                .map_err(|e| {
                    CacheError::BackendUnavailable(format!("memcached connect worker failed: {}", e))
                })?
                .map_err(|e| {
                    CacheError::BackendUnavailable(format!("Memcached connection failed: {}", e))
                })
        })
        .await?;
        client
            .set_read_timeout(Some(deadline))
            .and_then(|_| client.set_write_timeout(Some(deadline)))
            .map_err(|e| {
                CacheError::BackendUnavailable(format!("Memcached timeout setup failed: {}", e))
            })?;
        debug!("Memcached client initialized");
        Ok(Self {
            client: Arc::new(client),
            deadline,
            url: url.to_string(),
        })
    }

    /// Runs a blocking client call on the worker pool under the shared
    /// deadline.
    async fn blocking<T, F>(&self, op: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&memcache::Client) -> std::result::Result<T, memcache::MemcacheError>
            + Send
            + 'static,
    {
        let client = Arc::clone(&self.client);
        with_deadline(self.deadline, op, async move {
            tokio::task::spawn_blocking(move || f(&client))
                .await
                .map_err(|e| CacheError::OperationFailed(format!("{} worker failed: {}", op, e)))?
                .map_err(CacheError::from)
        })
        .await
    }
}

#[async_trait]
impl BackendAdapter for MemcachedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memcached
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.blocking("memcached get", move |client| client.get::<String>(&key))
            .await
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        let expiry = ttl_secs.min(u32::MAX as u64) as u32;
        self.blocking("memcached set", move |client| {
            client.set(&key, value.as_str(), expiry)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.blocking("memcached delete", move |client| client.delete(&key))
            .await
    }

    async fn increment(&self, key: &str, by: u64, ttl_secs: u64) -> Result<u64> {
        let key = key.to_string();
        let expiry = ttl_secs.min(u32::MAX as u64) as u32;
        self.blocking("memcached incr", move |client| {
            // INCR only works on existing keys; create-on-miss with the
            // window TTL, retrying once if another writer won the creation.
            match client.increment(&key, by) {
                Ok(value) => Ok(value),
                Err(_) => match client.add(&key, by.to_string().as_str(), expiry) {
                    Ok(()) => Ok(by),
                    Err(_) => client.increment(&key, by),
                },
            }
        })
        .await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        // The memcached protocol has no pattern deletion; matching entries
        // are left to expire via their TTLs (bounded staleness).
        debug!(
            "Memcached cannot delete by prefix; entries under '{}' left to expire",
            prefix
        );
        Ok(0)
    }

    async fn ping(&self) -> Result<()> {
        self.blocking("memcached version", |client| client.version())
            .await
            .map(|_| ())
            .map_err(|e| CacheError::BackendUnavailable(e.to_string()))
    }

    async fn entry_count(&self) -> Result<u64> {
        self.blocking("memcached stats", |client| client.stats())
            .await
            .map(|stats| sum_stat(&stats, "curr_items"))
    }

    async fn telemetry(&self) -> Result<BackendTelemetry> {
        self.blocking("memcached stats", |client| client.stats())
            .await
            .map(|stats| BackendTelemetry {
                memory_bytes: Some(sum_stat(&stats, "bytes")),
                connections: Some(sum_stat(&stats, "curr_connections")),
            })
    }
}

/// Sums a numeric stat across every node in the cluster.
fn sum_stat(stats: &[(String, std::collections::HashMap<String, String>)], name: &str) -> u64 {
    stats
        .iter()
        .filter_map(|(_, fields)| fields.get(name))
        .filter_map(|value| value.parse::<u64>().ok())
        .sum()
}
