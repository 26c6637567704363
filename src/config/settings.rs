use std::env;
use std::time::Duration;

use crate::backend::BackendSelection;
use crate::constants::{DEFAULT_BACKEND_TIMEOUT_MS, DEFAULT_NAMESPACE, DEFAULT_TTL_SECS};
use crate::error::{CacheError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace prepended to every key before it reaches any backend.
    pub namespace: String,
    /// Which fast-tier family to construct at startup.
    pub backend: BackendSelection,
    pub redis_url: Option<String>,
    pub memcached_url: Option<String>,
    /// Persistent option-table database.
    pub database_url: String,
    pub default_ttl_secs: u64,
    pub backend_timeout_ms: u64,
    /// Edge caches (reverse proxy, CDN) purged best-effort after a full purge.
    pub edge_purge_urls: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let backend = env::var("CACHE_BACKEND")
            .unwrap_or_else(|_| "auto".to_string())
            .parse::<BackendSelection>()?;
        Ok(Config {
            namespace: env::var("CACHE_NAMESPACE")
                .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string()),
            backend,
            redis_url: env::var("REDIS_URL").ok(),
            memcached_url: env::var("MEMCACHED_URL").ok(),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://contentpilot-cache.db?mode=rwc".to_string()),
            default_ttl_secs: env::var("CACHE_DEFAULT_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TTL_SECS),
            backend_timeout_ms: env::var("CACHE_BACKEND_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_BACKEND_TIMEOUT_MS),
            edge_purge_urls: env::var("EDGE_PURGE_URLS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|part| part.trim().to_string())
                        .filter(|part| !part.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() || self.namespace.chars().any(char::is_whitespace) {
            return Err(CacheError::Config(
                "CACHE_NAMESPACE must be non-empty without whitespace".to_string(),
            ));
        }
        if self.default_ttl_secs == 0 {
            return Err(CacheError::Config(
                "CACHE_DEFAULT_TTL_SECS must be greater than zero".to_string(),
            ));
        }
        if self.backend_timeout_ms == 0 {
            return Err(CacheError::Config(
                "CACHE_BACKEND_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }
        if self.database_url.is_empty() {
            return Err(CacheError::Config("DATABASE_URL cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Logs the effective settings. Connection URLs are reported only by
    /// presence; they can carry credentials.
    pub fn log_summary(&self) {
        log::info!(
            "Cache configuration: namespace={} backend={:?} redis_url={} memcached_url={} ttl={}s timeout={}ms edge_purge_urls={}",
            self.namespace,
            self.backend,
            if self.redis_url.is_some() { "set" } else { "unset" },
            if self.memcached_url.is_some() { "set" } else { "unset" },
            self.default_ttl_secs,
            self.backend_timeout_ms,
            self.edge_purge_urls.len(),
        );
    }
}
