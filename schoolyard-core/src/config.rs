//! Store configuration.
//!
//! Loaded from environment variables with development defaults, in the same
//! shape everywhere: a `Default` impl with the reference values and a
//! `from_env()` that overrides from `SCHOOLYARD_*` variables.

use std::time::Duration;

/// Configuration for the document store and its query cache.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum age of a cache entry before it is treated as a miss.
    pub cache_ttl: Duration,

    /// Maximum number of cache entries before LRU eviction kicks in.
    pub cache_capacity: usize,

    /// Queries with a limit above this are never cached; unbounded queries
    /// always bypass the cache so arbitrarily large payloads never pin memory.
    pub cacheable_query_limit: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300), // 5 minutes
            cache_capacity: 1000,
            cacheable_query_limit: 100,
        }
    }
}

impl StoreConfig {
    /// Create a StoreConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SCHOOLYARD_CACHE_TTL_SECS`: Cache entry time-to-live (default: 300)
    /// - `SCHOOLYARD_CACHE_CAPACITY`: Max cache entries (default: 1000)
    /// - `SCHOOLYARD_CACHEABLE_QUERY_LIMIT`: Largest cacheable query limit (default: 100)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache_ttl = std::env::var("SCHOOLYARD_CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_ttl);

        let cache_capacity = std::env::var("SCHOOLYARD_CACHE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cache_capacity);

        let cacheable_query_limit = std::env::var("SCHOOLYARD_CACHEABLE_QUERY_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cacheable_query_limit);

        Self {
            cache_ttl,
            cache_capacity,
            cacheable_query_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.cache_capacity, 1000);
        assert_eq!(config.cacheable_query_limit, 100);
    }
}
