// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backends.
//!
//! - [`sql`]: relational store (Postgres in production, SQLite in tests)
//! - [`redis`]: list cache
//! - [`memory`]: in-process cache for tests and single-node setups

pub mod traits;
pub mod sql;
pub mod redis;
pub mod memory;

/// Cache key for list slot `n`.
///
/// The list read keys slots by position, and invalidation keys them by good
/// id. The two only agree while ids are contiguous from 1.
#[must_use]
pub fn cache_key(n: i64) -> String {
    format!("goods:{}", n)
}

/// Inverse of [`cache_key`].
#[must_use]
pub fn parse_cache_key(key: &str) -> Option<i64> {
    key.strip_prefix("goods:")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_round_trip() {
        assert_eq!(cache_key(42), "goods:42");
        assert_eq!(parse_cache_key("goods:42"), Some(42));
    }

    #[test]
    fn test_parse_rejects_foreign_keys() {
        assert_eq!(parse_cache_key("users:1"), None);
        assert_eq!(parse_cache_key("goods:abc"), None);
        assert_eq!(parse_cache_key("goods:"), None);
    }
}
