// src/store/sqlite.rs
//! SQLite-backed option table.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::store::PersistentStore;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS cache_options (\
     name TEXT PRIMARY KEY, \
     value TEXT NOT NULL, \
     expires_at INTEGER NOT NULL)";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (or creates) the option table behind `database_url` and sweeps
    /// rows that expired while the process was down.
    pub async fn connect(database_url: &str) -> Result<Self> {
        // A pooled in-memory database would give every connection its own
        // empty store; pin it to a single connection.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        let store = Self { pool };
        let swept = store.sweep_expired().await?;
        if swept > 0 {
            info!("Swept {} expired cache rows at startup", swept);
        }
        Ok(store)
    }

    /// In-memory store for tests and throwaway runs.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Deletes every expired row; returns how many were removed.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache_options WHERE expires_at <= ?1")
            .bind(now_ts())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn now_ts() -> i64 {
    Utc::now().timestamp()
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<(String, u64)>> {
        let now = now_ts();
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT value, expires_at FROM cache_options WHERE name = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((value, expires_at)) if expires_at > now => {
                Ok(Some((value, (expires_at - now) as u64)))
            }
            Some(_) => {
                // Reap the expired row we just tripped over.
                sqlx::query("DELETE FROM cache_options WHERE name = ?1 AND expires_at <= ?2")
                    .bind(key)
                    .bind(now)
                    .execute(&self.pool)
                    .await?;
                debug!("Reaped expired persistent entry");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let expires_at = now_ts().saturating_add(ttl_secs as i64);
        sqlx::query(
            "INSERT INTO cache_options (name, value, expires_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, \
             expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed: Option<i64> =
            sqlx::query_scalar("DELETE FROM cache_options WHERE name = ?1 RETURNING expires_at")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        // Deleting an already-expired row is not a live deletion.
        Ok(matches!(removed, Some(expires_at) if expires_at > now_ts()))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM cache_options WHERE name LIKE ?1 ESCAPE '\\'")
                .bind(format!("{}%", escape_like(prefix)))
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn entry_count(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cache_options WHERE expires_at > ?1")
                .bind(now_ts())
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

/// Escapes `LIKE` wildcards so a key prefix matches literally.
fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
