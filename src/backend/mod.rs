// src/backend/mod.rs
//! Fast-tier backend adapters.
//!
//! Every adapter speaks the same [`BackendAdapter`] contract so the cache
//! manager stays backend-agnostic. Adapters report failure to their caller;
//! they never panic and never terminate the process.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::utils::truncate_msg;

pub mod memcached;
pub mod memory;
pub mod redis;

pub use self::memcached::MemcachedBackend;
pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

/// Uniform contract over an external key-value store.
///
/// Values are opaque text (JSON-encoded by the cache manager). Counter keys
/// hold decimal integers so they stay readable through [`BackendAdapter::get`].
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Which backend family this adapter belongs to.
    fn kind(&self) -> BackendKind;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically adds `by` and returns the new value. `ttl_secs` is applied
    /// only when the counter is created by this call; later increments leave
    /// the original expiry in place.
    async fn increment(&self, key: &str, by: u64, ttl_secs: u64) -> Result<u64>;

    /// Deletes every key starting with `prefix`, returning how many were
    /// removed. Backends without pattern support return `Ok(0)` and leave
    /// entries to expire.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;

    async fn ping(&self) -> Result<()>;

    /// Approximate number of entries held by the backend instance.
    async fn entry_count(&self) -> Result<u64>;

    /// Memory/connection figures where the backend exposes them.
    async fn telemetry(&self) -> Result<BackendTelemetry>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Redis,
    Memcached,
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Redis => write!(f, "redis"),
            BackendKind::Memcached => write!(f, "memcached"),
            BackendKind::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendTelemetry {
    pub memory_bytes: Option<u64>,
    pub connections: Option<u64>,
}

/// Which fast-tier family to construct at startup.
///
/// `Auto` probes the external families in preference order; the embedded
/// memory backend must be asked for explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendSelection {
    #[default]
    Auto,
    Redis,
    Memcached,
    Memory,
    None,
}

impl FromStr for BackendSelection {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendSelection::Auto),
            "redis" => Ok(BackendSelection::Redis),
            "memcached" => Ok(BackendSelection::Memcached),
            "memory" => Ok(BackendSelection::Memory),
            "none" => Ok(BackendSelection::None),
            other => Err(CacheError::Config(format!(
                "unknown CACHE_BACKEND value '{}' (expected auto|redis|memcached|memory|none)",
                other
            ))),
        }
    }
}

/// Resolves the active fast tier once at startup.
///
/// For `Auto`, constructors are tried in fixed preference order (Redis, then
/// Memcached); the first adapter whose ping succeeds becomes the fast tier.
/// An explicit kind tries only that constructor. When nothing answers, the
/// fast tier is simply absent and the cache runs persistent-only.
pub async fn select_backend(config: &Config) -> Option<Arc<dyn BackendAdapter>> {
    let deadline = config.backend_timeout();
    let candidates: Vec<BackendKind> = match config.backend {
        BackendSelection::None => return None,
        BackendSelection::Auto => vec![BackendKind::Redis, BackendKind::Memcached],
        BackendSelection::Redis => vec![BackendKind::Redis],
        BackendSelection::Memcached => vec![BackendKind::Memcached],
        BackendSelection::Memory => vec![BackendKind::Memory],
    };

    for kind in candidates {
        match construct(kind, config, deadline).await {
            Ok(adapter) => match adapter.ping().await {
                Ok(()) => {
                    info!("Fast tier active: {} backend", kind);
                    return Some(adapter);
                }
                Err(e) => {
                    warn!(
                        "{} backend constructed but ping failed: {}",
                        kind,
                        truncate_msg(&e.to_string(), 120)
                    );
                }
            },
            Err(e) => {
                warn!(
                    "{} backend unavailable: {}",
                    kind,
                    truncate_msg(&e.to_string(), 120)
                );
            }
        }
    }

    warn!("No fast-tier backend available; operating persistent-tier-only");
    None
}

async fn construct(
    kind: BackendKind,
    config: &Config,
    deadline: Duration,
) -> Result<Arc<dyn BackendAdapter>> {
    match kind {
        BackendKind::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                CacheError::Config("REDIS_URL is not set".to_string())
            })?;
            let backend = RedisBackend::connect(url, deadline).await?;
            Ok(Arc::new(backend))
        }
        BackendKind::Memcached => {
            let url = config.memcached_url.as_deref().ok_or_else(|| {
                CacheError::Config("MEMCACHED_URL is not set".to_string())
            })?;
            let backend = MemcachedBackend::connect(url, deadline).await?;
            Ok(Arc::new(backend))
        }
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}

/// Bounds a backend round trip with the configured per-call deadline.
pub(crate) async fn with_deadline<T, F>(deadline: Duration, op: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => Err(CacheError::OperationFailed(format!(
            "{} timed out after {}ms",
            op,
            deadline.as_millis()
        ))),
    }
}
