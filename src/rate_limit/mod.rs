// src/rate_limit/mod.rs
//! Fixed-window rate limiting on top of the tiered cache.
//!
//! Windows are anchored at the first attempt: the counter's TTL is set when
//! the counter is created and never refreshed, so the window resets by
//! natural expiry. When the fast tier's atomic increment is unavailable the
//! limiter falls back to a read-then-write through the persistent tier,
//! accepting a small under-count under concurrent writers; when every tier
//! fails it degrades to permissive rather than blocking callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::backend::BackendKind;
use crate::cache::CacheManager;
use crate::constants::{
    MAX_ACTION_LEN, MAX_IDENTIFIER_LEN, MAX_LIMIT, MAX_WINDOW_SECS, MIN_LIMIT, MIN_WINDOW_SECS,
    SCOPE_DIGEST_LEN,
};
use crate::error::{CacheError, Result};
use crate::utils::truncate_msg;

pub mod identity;

pub use identity::{anonymize, client_ip, RequestMeta};

pub struct RateLimiter {
    cache: Arc<CacheManager>,
    counters: Counters,
}

#[derive(Default)]
struct Counters {
    checks: AtomicU64,
    limited: AtomicU64,
    fast_increments: AtomicU64,
    fallback_increments: AtomicU64,
    permissive_failures: AtomicU64,
}

impl RateLimiter {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self {
            cache,
            counters: Counters::default(),
        }
    }

    /// Read-only check: whether `identifier` has exhausted `limit` attempts
    /// of `action` within the current window. Never increments. Degrades to
    /// permissive (`false`) when no tier can produce a counter.
    pub async fn is_rate_limited(
        &self,
        action: &str,
        limit: u64,
        window_secs: u64,
        identifier: &str,
    ) -> Result<bool> {
        validate_action(action)?;
        validate_limit(limit)?;
        validate_window(window_secs)?;
        let identifier = sanitize_identifier(identifier)?;
        self.counters.checks.fetch_add(1, Ordering::Relaxed);

        let key = scope_key(action, &identifier);
        let count = self.cache.read_counter(&key).await?;
        let limited = count >= limit;
        if limited {
            self.counters.limited.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Rate limit reached for action '{}' by {} ({}/{})",
                action,
                anonymize(&identifier),
                count,
                limit
            );
        }
        Ok(limited)
    }

    /// Records one attempt and returns the new count for the window.
    ///
    /// The fast tier's atomic increment is exact under concurrency; the
    /// persistent fallback is approximate. On total failure the attempt is
    /// counted as the first of a window and the caller proceeds.
    pub async fn record_attempt(
        &self,
        action: &str,
        window_secs: u64,
        identifier: &str,
    ) -> Result<u64> {
        validate_action(action)?;
        validate_window(window_secs)?;
        let identifier = sanitize_identifier(identifier)?;

        let key = scope_key(action, &identifier);
        match self.cache.increment_fast(&key, 1, window_secs).await {
            Ok(count) => {
                self.counters.fast_increments.fetch_add(1, Ordering::Relaxed);
                Ok(count)
            }
            Err(e) => {
                debug!(
                    "Fast-tier increment unavailable for action '{}': {}",
                    action,
                    truncate_msg(&e.to_string(), 120)
                );
                self.fallback_increment(&key, action, &identifier, window_secs)
                    .await
            }
        }
    }

    /// Read-then-write through the persistent tier. Two concurrent callers
    /// can observe the same pre-increment value and both write `count + 1`;
    /// that under-count is the accepted availability tradeoff.
    async fn fallback_increment(
        &self,
        key: &str,
        action: &str,
        identifier: &str,
        window_secs: u64,
    ) -> Result<u64> {
        let current = self.cache.read_persistent_counter(key).await?;
        let next = current.saturating_add(1);
        match self.cache.set_persistent_counter(key, next, window_secs).await {
            Ok(()) => {
                self.counters
                    .fallback_increments
                    .fetch_add(1, Ordering::Relaxed);
                Ok(next)
            }
            Err(e) => {
                self.counters
                    .permissive_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    "All tiers failed recording '{}' attempt by {}; treating as first attempt: {}",
                    action,
                    anonymize(identifier),
                    truncate_msg(&e.to_string(), 120)
                );
                Ok(1)
            }
        }
    }

    /// [`RateLimiter::is_rate_limited`] with the identifier derived from the
    /// calling request's forwarding headers.
    pub async fn is_rate_limited_for_request(
        &self,
        action: &str,
        limit: u64,
        window_secs: u64,
        meta: &RequestMeta,
    ) -> Result<bool> {
        let ip = client_ip(meta);
        self.is_rate_limited(action, limit, window_secs, &ip.to_string())
            .await
    }

    /// [`RateLimiter::record_attempt`] with the identifier derived from the
    /// calling request's forwarding headers.
    pub async fn record_attempt_for_request(
        &self,
        action: &str,
        window_secs: u64,
        meta: &RequestMeta,
    ) -> Result<u64> {
        let ip = client_ip(meta);
        self.record_attempt(action, window_secs, &ip.to_string())
            .await
    }

    /// Read-only operational snapshot.
    pub fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            backend: self.cache.fast_backend(),
            checks: self.counters.checks.load(Ordering::Relaxed),
            limited: self.counters.limited.load(Ordering::Relaxed),
            fast_increments: self.counters.fast_increments.load(Ordering::Relaxed),
            fallback_increments: self.counters.fallback_increments.load(Ordering::Relaxed),
            permissive_failures: self.counters.permissive_failures.load(Ordering::Relaxed),
        }
    }
}

/// Stable scope key for an `(action, identifier)` pair. Hashing keeps raw
/// identifiers out of backend key listings and bounds the key length.
pub fn scope_key(action: &str, identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(action.as_bytes());
    hasher.update(b":");
    hasher.update(identifier.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("rl:{}", &digest[..SCOPE_DIGEST_LEN])
}

fn validate_action(action: &str) -> Result<()> {
    if action.trim().is_empty() {
        return Err(CacheError::Validation(
            "rate-limit action cannot be empty".to_string(),
        ));
    }
    if action.len() > MAX_ACTION_LEN {
        return Err(CacheError::Validation(format!(
            "rate-limit action exceeds {} bytes",
            MAX_ACTION_LEN
        )));
    }
    Ok(())
}

fn validate_window(window_secs: u64) -> Result<()> {
    if !(MIN_WINDOW_SECS..=MAX_WINDOW_SECS).contains(&window_secs) {
        return Err(CacheError::Validation(format!(
            "window of {}s is outside [{}, {}]",
            window_secs, MIN_WINDOW_SECS, MAX_WINDOW_SECS
        )));
    }
    Ok(())
}

fn validate_limit(limit: u64) -> Result<()> {
    if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        return Err(CacheError::Validation(format!(
            "limit of {} is outside [{}, {}]",
            limit, MIN_LIMIT, MAX_LIMIT
        )));
    }
    Ok(())
}

fn sanitize_identifier(identifier: &str) -> Result<String> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(CacheError::Validation(
            "rate-limit identifier cannot be empty".to_string(),
        ));
    }
    if trimmed.len() > MAX_IDENTIFIER_LEN {
        return Err(CacheError::Validation(format!(
            "rate-limit identifier exceeds {} bytes",
            MAX_IDENTIFIER_LEN
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(CacheError::Validation(
            "rate-limit identifier contains control characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub backend: Option<BackendKind>,
    pub checks: u64,
    pub limited: u64,
    pub fast_increments: u64,
    pub fallback_increments: u64,
    pub permissive_failures: u64,
}

impl std::fmt::Display for RateLimitStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rate-limit: backend={} checks={} limited={} increments={}+{} permissive_failures={}",
            self.backend
                .map(|kind| kind.to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.checks,
            self.limited,
            self.fast_increments,
            self.fallback_increments,
            self.permissive_failures,
        )
    }
}
