// src/rate_limit/identity.rs
//! Caller identity derivation and log anonymization.
//!
//! When no explicit identifier is supplied, the caller's network address is
//! derived from proxy/forwarding headers in a fixed priority order, falling
//! back to the direct connection address and finally a sentinel. Identifiers
//! never reach a log line raw; [`anonymize`] is the only accepted spelling.

use std::net::{IpAddr, Ipv4Addr};

use sha2::{Digest, Sha256};

use crate::constants::{ANON_DIGEST_LEN, FORWARD_HEADERS, SENTINEL_ADDR};

/// Transport-level facts about the calling request, supplied by the host
/// application. Header names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    headers: Vec<(String, String)>,
    remote_addr: Option<IpAddr>,
}

impl RequestMeta {
    pub fn new(remote_addr: Option<IpAddr>) -> Self {
        Self {
            headers: Vec::new(),
            remote_addr,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Derives the client address from forwarding headers, then the connection
/// address, validating every candidate as a syntactic IPv4/IPv6 address.
/// Yields the sentinel when nothing valid is found.
pub fn client_ip(meta: &RequestMeta) -> IpAddr {
    for header in FORWARD_HEADERS {
        let Some(value) = meta.header(header) else {
            continue;
        };
        // X-Forwarded-For lists hops client-first.
        let candidate = match value.split_once(',') {
            Some((first, _)) => first,
            None => value,
        };
        if let Ok(ip) = candidate.trim().parse::<IpAddr>() {
            return ip;
        }
    }
    meta.remote_addr.unwrap_or_else(sentinel)
}

/// The fixed fallback address for requests with no derivable client IP.
pub fn sentinel() -> IpAddr {
    SENTINEL_ADDR
        .parse()
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Irreversibly shortens an identifier for log output: a truncated SHA-256
/// digest that is stable per identifier but cannot be mapped back.
pub fn anonymize(identifier: &str) -> String {
    let digest = Sha256::digest(identifier.as_bytes());
    let hexed = hex::encode(digest);
    format!("anon:{}", &hexed[..ANON_DIGEST_LEN.min(hexed.len())])
}
