// src/backend/redis.rs
//! Redis adapter, the preferred fast-tier family.
//!
//! Uses a `ConnectionManager` for automatic reconnection; the manager is
//! long-lived and cloned per call, so no per-call connection setup happens
//! after construction.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::backend::{with_deadline, BackendAdapter, BackendKind, BackendTelemetry};
use crate::error::{CacheError, Result};
use crate::utils::truncate_msg;

#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
    deadline: Duration,
    url: String,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("url", &self.url)
            .field("deadline", &self.deadline)
            .field("manager", &"<ConnectionManager instance>")
            .finish()
    }
}

impl RedisBackend {
    pub async fn connect(url: &str, deadline: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::Config(format!("invalid Redis URL: {}", e)))?;
        let manager = with_deadline(deadline, "redis connect", async {
            ConnectionManager::new(client).await.map_err(|e| {
                CacheError::BackendUnavailable(format!("Redis connection failed: {}", e))
            })
        })
        .await?;
        debug!("Redis connection manager initialized");
        Ok(Self {
            manager,
            deadline,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl BackendAdapter for RedisBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        with_deadline(self.deadline, "redis GET", async move {
            Ok(conn.get::<_, Option<String>>(key).await?)
        })
        .await
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.manager.clone();
        with_deadline(self.deadline, "redis SETEX", async move {
            conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        with_deadline(self.deadline, "redis DEL", async move {
            let removed: i64 = conn.del(key).await?;
            Ok(removed > 0)
        })
        .await
    }

    async fn increment(&self, key: &str, by: u64, ttl_secs: u64) -> Result<u64> {
        let mut conn = self.manager.clone();
        let deadline = self.deadline;
        with_deadline(deadline, "redis INCRBY", async move {
            let new_value: u64 = conn.incr(key, by).await?;
            if new_value == by {
                // First write for this key: the TTL anchors the window.
                if let Err(e) = conn.expire::<_, i64>(key, ttl_secs as i64).await {
                    warn!(
                        "Redis EXPIRE after counter creation failed: {}",
                        truncate_msg(&e.to_string(), 120)
                    );
                }
            }
            Ok(new_value)
        })
        .await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let pattern = format!("{}*", prefix);
        let mut scan_conn = self.manager.clone();
        let mut del_conn = self.manager.clone();
        with_deadline(self.deadline, "redis SCAN/DEL", async move {
            let mut keys: Vec<String> = Vec::new();
            {
                let mut iter = scan_conn.scan_match::<_, String>(pattern).await?;
                while let Some(key) = iter.next_item().await {
                    keys.push(key);
                }
            }
            if keys.is_empty() {
                return Ok(0);
            }
            let removed: u64 = del_conn.del(&keys).await?;
            Ok(removed)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        with_deadline(self.deadline, "redis PING", async move {
            let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
            if reply == "PONG" {
                Ok(())
            } else {
                Err(CacheError::BackendUnavailable(format!(
                    "unexpected PING reply: {}",
                    truncate_msg(&reply, 40)
                )))
            }
        })
        .await
    }

    async fn entry_count(&self) -> Result<u64> {
        let mut conn = self.manager.clone();
        with_deadline(self.deadline, "redis DBSIZE", async move {
            let count: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
            Ok(count)
        })
        .await
    }

    async fn telemetry(&self) -> Result<BackendTelemetry> {
        let mut conn = self.manager.clone();
        with_deadline(self.deadline, "redis INFO", async move {
            let info: String = redis::cmd("INFO").query_async(&mut conn).await?;
            Ok(BackendTelemetry {
                memory_bytes: parse_info_field(&info, "used_memory"),
                connections: parse_info_field(&info, "connected_clients"),
            })
        })
        .await
    }
}

/// Pulls a numeric field out of an `INFO` reply (`name:value` lines).
fn parse_info_field(info: &str, field: &str) -> Option<u64> {
    info.lines().find_map(|line| {
        let rest = line.strip_prefix(field)?;
        let value = rest.strip_prefix(':')?;
        value.trim().parse::<u64>().ok()
    })
}
