// src/cache/edge.rs
//! Best-effort purging of external edge caches (reverse proxy, CDN).
//!
//! These calls are optimizations, not correctness requirements: every
//! failure is logged and dropped.

use std::time::Duration;

use log::{debug, warn};
use reqwest::Method;
use url::Url;

use crate::utils::truncate_msg;

pub struct EdgePurger {
    client: reqwest::Client,
    targets: Vec<Url>,
}

impl EdgePurger {
    /// Returns `None` when no usable purge endpoint is configured.
    pub fn new(urls: &[String], timeout: Duration) -> Option<Self> {
        if urls.is_empty() {
            return None;
        }
        let targets: Vec<Url> = urls
            .iter()
            .filter_map(|raw| match Url::parse(raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Ignoring invalid edge purge URL: {}", e);
                    None
                }
            })
            .collect();
        if targets.is_empty() {
            return None;
        }
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                warn!("Edge purge client unavailable: {}", truncate_msg(&e.to_string(), 120));
                return None;
            }
        };
        Some(Self { client, targets })
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Fires a `PURGE` request at every configured endpoint.
    ///
    /// Purge URLs can embed tokens, so log lines carry the host only.
    pub async fn purge_all(&self) {
        let method = Method::from_bytes(b"PURGE").unwrap_or(Method::GET);
        for url in &self.targets {
            let host = url.host_str().unwrap_or("<no-host>");
            match self.client.request(method.clone(), url.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Edge purge accepted by {}", host);
                }
                Ok(response) => {
                    warn!("Edge purge rejected by {}: HTTP {}", host, response.status());
                }
                Err(e) => {
                    warn!(
                        "Edge purge to {} failed: {}",
                        host,
                        truncate_msg(&e.to_string(), 120)
                    );
                }
            }
        }
    }
}
