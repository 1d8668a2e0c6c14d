//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Public tokens grant read access to a result and storage keys reveal
//! upload names, so neither is logged verbatim.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Number of leading token characters kept by [`redact_token`].
const TOKEN_PREFIX_LEN: usize = 6;

/// Keeps a short prefix of a public token for correlation.
///
/// - `Xk3vQ9...` (43 chars) → `Xk3vQ9…`
/// - tokens no longer than the prefix → `****`
pub fn redact_token(token: &str) -> String {
    if token.chars().count() <= TOKEN_PREFIX_LEN {
        return "****".to_string();
    }
    let prefix: String = token.chars().take(TOKEN_PREFIX_LEN).collect();
    format!("{}…", prefix)
}

/// Returns only the last segment of a storage key (`raw/abc.pdf` → `abc.pdf`).
pub fn redact_key(key: &str) -> String {
    match key.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "<unknown>".to_string(),
    }
}

/// Short deterministic hash of a value, for correlating log lines without
/// exposing it.
pub fn hash_value(value: &str) -> String {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
