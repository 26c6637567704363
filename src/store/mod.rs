// src/store/mod.rs
//! Persistent fallback tier.
//!
//! The slow-but-durable side of the cache: an option-table style key/value
//! store. Expired rows are treated as absent everywhere and reaped lazily.

use async_trait::async_trait;

use crate::error::Result;

pub mod sqlite;

pub use self::sqlite::SqliteStore;

#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Returns the stored value with its remaining TTL in seconds. Never
    /// returns an expired entry.
    async fn get(&self, key: &str) -> Result<Option<(String, u64)>>;

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Returns whether a live entry existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Deletes every entry whose key starts with `prefix`; returns the
    /// number of rows removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;

    /// Number of live (unexpired) entries.
    async fn entry_count(&self) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}
