// src/main.rs
//! Operational CLI for the cache subsystem: probe backends, inspect stats,
//! poke entries and run purges against the configured stack.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use contentpilot_cache::rate_limit::RateLimiter;
use contentpilot_cache::utils::setup_logging;
use contentpilot_cache::{load_config, CacheManager};

#[derive(Parser)]
#[command(name = "contentpilot-cache", version, about = "ContentPilot cache operations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the configured tiers and report which answered.
    Ping,
    /// Print cache and rate-limit statistics.
    Stats,
    /// Read a key.
    Get {
        key: String,
    },
    /// Write a key with an optional TTL in seconds.
    Set {
        key: String,
        value: String,
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Delete a key.
    Delete {
        key: String,
    },
    /// Purge entries under a prefix, or the whole namespace.
    Purge {
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Probe a rate limit: record one attempt and report the window count.
    Check {
        action: String,
        #[arg(long, default_value_t = 60)]
        window: u64,
        #[arg(long, default_value = "cli")]
        identifier: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to initialize logging")?;
    let cli = Cli::parse();

    let config = load_config().context("Failed to load configuration")?;
    let cache = CacheManager::from_config(&config)
        .await
        .context("Failed to build cache stack")?;
    info!(
        "Cache stack ready (fast tier: {})",
        cache
            .fast_backend()
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    match cli.command {
        Command::Ping => {
            let stats = cache.stats().await;
            match stats.backend {
                Some(kind) => println!("fast tier: {} (entries: {:?})", kind, stats.fast_entries),
                None => println!("fast tier: absent"),
            }
            match stats.persistent_entries {
                Some(count) => println!("persistent tier: ok ({} live entries)", count),
                None => println!("persistent tier: unreachable"),
            }
        }
        Command::Stats => {
            let cache = std::sync::Arc::new(cache);
            let limiter = RateLimiter::new(cache.clone());
            println!("{}", cache.stats().await);
            println!("{}", limiter.stats());
        }
        Command::Get { key } => match cache.get::<serde_json::Value>(&key).await? {
            Some(value) => println!("{}", value),
            None => println!("(miss)"),
        },
        Command::Set { key, value, ttl } => {
            // Store raw strings as JSON strings, JSON input as-is.
            let payload: serde_json::Value = serde_json::from_str(&value)
                .unwrap_or(serde_json::Value::String(value));
            let persisted = cache.set(&key, &payload, ttl).await?;
            println!("persisted: {}", persisted);
        }
        Command::Delete { key } => {
            let existed = cache.delete(&key).await?;
            println!("deleted: {}", existed);
        }
        Command::Purge { prefix } => {
            let removed = match prefix {
                Some(prefix) => cache.purge_prefix(&prefix).await?,
                None => cache.purge_all().await?,
            };
            println!("purged {} persistent entries", removed);
        }
        Command::Check {
            action,
            window,
            identifier,
        } => {
            let limiter = RateLimiter::new(std::sync::Arc::new(cache));
            let count = limiter.record_attempt(&action, window, &identifier).await?;
            println!("attempt recorded; window count: {}", count);
        }
    }

    Ok(())
}
