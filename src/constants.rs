// src/constants.rs
//! Centralized limits and defaults for the cache and rate-limiting layers.
//!
//! Caller-supplied parameters are checked against these bounds and rejected
//! when out of range, never silently clamped.

/// Smallest accepted rate-limit window (one minute).
pub const MIN_WINDOW_SECS: u64 = 60;

/// Largest accepted rate-limit window (one day).
pub const MAX_WINDOW_SECS: u64 = 86_400;

/// Smallest accepted attempt limit.
pub const MIN_LIMIT: u64 = 1;

/// Largest accepted attempt limit.
pub const MAX_LIMIT: u64 = 1_000;

/// Longest accepted rate-limit identifier, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// Longest accepted action name, in bytes.
pub const MAX_ACTION_LEN: usize = 50;

/// Longest accepted cache key after namespacing, in bytes.
///
/// Matches the Memcached wire limit so a key valid here is valid on every
/// backend family.
pub const MAX_KEY_LEN: usize = 250;

/// Default TTL applied when the caller does not supply one.
pub const DEFAULT_TTL_SECS: u64 = 3_600;

/// Default per-call deadline for backend round trips, in milliseconds.
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 2_000;

/// Default key namespace prepended to every key before it reaches a backend.
pub const DEFAULT_NAMESPACE: &str = "contentpilot";

/// Forwarding headers probed for the client address, in priority order.
/// `X-Forwarded-For` is read as its first (client-most) hop.
pub const FORWARD_HEADERS: [&str; 3] = ["cf-connecting-ip", "x-forwarded-for", "x-real-ip"];

/// Sentinel address used when no syntactically valid client address can be
/// derived from a request.
pub const SENTINEL_ADDR: &str = "0.0.0.0";

/// Hex digits of the SHA-256 digest kept when anonymizing an identifier for
/// log output.
pub const ANON_DIGEST_LEN: usize = 12;

/// Hex digits of the SHA-256 digest used for rate-limit scope keys.
pub const SCOPE_DIGEST_LEN: usize = 16;
