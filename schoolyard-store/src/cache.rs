//! Query cache: TTL + LRU, invalidated per collection.
//!
//! An owned component, not process-global state, so every test can construct
//! an isolated instance. Keys are `"{collection}:{id}"` for single reads and
//! `"{collection}:query:{hash}"` for bounded queries; any write to a
//! collection removes every key under that collection's prefix. Coarse, but
//! correctness-first: invalidation always wins over TTL.

use lru::LruCache;
use schoolyard_core::{CoreResult, Document, QuerySpec, StorageError};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Cache key for a single-document read.
pub fn doc_key(collection: &str, id: &str) -> String {
    format!("{}:{}", collection, id)
}

/// Cache key for a bounded query.
pub fn query_key(collection: &str, hash: &str) -> String {
    format!("{}:query:{}", collection, hash)
}

/// Stable hash of a query shape, for use in `query_key`.
pub fn query_hash(collection: &str, spec: &QuerySpec) -> CoreResult<String> {
    let serialized = serde_json::to_string(spec).map_err(|e| StorageError::Serialization {
        reason: e.to_string(),
    })?;
    let mut hasher = Sha256::new();
    hasher.update(collection.as_bytes());
    hasher.update(b":");
    hasher.update(serialized.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// A cached read result: one document or a query's document list.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Document(Document),
    List(Vec<Document>),
}

#[derive(Debug)]
struct CacheEntry {
    value: CachedValue,
    inserted_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Time-boxed, size-bounded cache for read results.
#[derive(Debug)]
pub struct QueryCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
}

impl QueryCache {
    /// Create a cache with the given entry TTL and capacity.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            ttl,
        }
    }

    // A poisoned mutex just means a panic elsewhere; the LRU map is still
    // structurally sound, so recover rather than cascade the panic.
    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch a value, treating anything older than the TTL as absent.
    ///
    /// A hit marks the entry most-recently-used; an expired entry is evicted
    /// on the spot and counted as a miss.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        let mut inner = self.lock();

        let fresh = match inner.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() <= self.ttl,
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if fresh {
            inner.hits += 1;
            inner.entries.peek(key).map(|entry| entry.value.clone())
        } else {
            inner.entries.pop(key);
            inner.misses += 1;
            None
        }
    }

    /// Insert or refresh an entry, evicting the least-recently-used entry
    /// when over capacity.
    pub fn put(&self, key: impl Into<String>, value: CachedValue) {
        let key = key.into();
        let mut inner = self.lock();
        let evicted = inner.entries.push(
            key.clone(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        if let Some((old_key, _)) = evicted {
            if old_key != key {
                inner.evictions += 1;
            }
        }
    }

    /// Remove every entry whose key belongs to the given collection.
    /// Returns the number of entries removed.
    pub fn invalidate_collection(&self, collection: &str) -> usize {
        let prefix = format!("{}:", collection);
        let mut inner = self.lock();
        let stale: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            inner.entries.pop(key);
        }
        stale.len()
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of live entries (expired-but-unevicted entries included).
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of hit/miss/eviction counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entry_count: inner.entries.len() as u64,
            evictions: inner.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schoolyard_core::Filter;
    use serde_json::json;

    fn doc(id: &str) -> Document {
        Document::new(id, serde_json::Map::new())
    }

    #[test]
    fn test_get_put_round_trip() {
        let cache = QueryCache::new(Duration::from_secs(60), 10);
        assert!(cache.get("posts:p1").is_none());

        cache.put("posts:p1", CachedValue::Document(doc("p1")));
        match cache.get("posts:p1") {
            Some(CachedValue::Document(d)) => assert_eq!(d.id, "p1"),
            other => panic!("expected document hit, got {:?}", other),
        }
    }

    #[test]
    fn test_ttl_expiry_treated_as_miss() {
        let cache = QueryCache::new(Duration::from_millis(20), 10);
        cache.put("posts:p1", CachedValue::Document(doc("p1")));
        assert!(cache.get("posts:p1").is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("posts:p1").is_none());
        // The expired entry was evicted, not just hidden.
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_lru_eviction_beyond_capacity() {
        let cache = QueryCache::new(Duration::from_secs(60), 2);
        cache.put("a:1", CachedValue::Document(doc("1")));
        cache.put("a:2", CachedValue::Document(doc("2")));

        // Touch a:1 so a:2 becomes the eviction candidate.
        assert!(cache.get("a:1").is_some());
        cache.put("a:3", CachedValue::Document(doc("3")));

        assert!(cache.get("a:1").is_some());
        assert!(cache.get("a:2").is_none());
        assert!(cache.get("a:3").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_invalidate_collection_is_prefix_scoped() {
        let cache = QueryCache::new(Duration::from_secs(60), 10);
        cache.put("posts:p1", CachedValue::Document(doc("p1")));
        cache.put("posts:query:abc", CachedValue::List(vec![doc("p1")]));
        cache.put("comments:c1", CachedValue::Document(doc("c1")));

        let removed = cache.invalidate_collection("posts");
        assert_eq!(removed, 2);
        assert!(cache.get("posts:p1").is_none());
        assert!(cache.get("posts:query:abc").is_none());
        assert!(cache.get("comments:c1").is_some());
    }

    #[test]
    fn test_invalidate_does_not_hit_prefix_siblings() {
        // "posts" must not wipe "posts_archive".
        let cache = QueryCache::new(Duration::from_secs(60), 10);
        cache.put("posts_archive:x", CachedValue::Document(doc("x")));
        cache.invalidate_collection("posts");
        assert!(cache.get("posts_archive:x").is_some());
    }

    #[test]
    fn test_clear_removes_everything() {
        let cache = QueryCache::new(Duration::from_secs(60), 10);
        cache.put("a:1", CachedValue::Document(doc("1")));
        cache.put("b:2", CachedValue::Document(doc("2")));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_hit_rate() {
        let cache = QueryCache::new(Duration::from_secs(60), 10);
        cache.put("a:1", CachedValue::Document(doc("1")));
        cache.get("a:1");
        cache.get("a:1");
        cache.get("a:missing");
        cache.get("a:missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert!((stats.hit_rate() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_query_hash_is_stable_and_shape_sensitive() {
        let spec_a = QuerySpec::filtered(vec![Filter::eq("subject", json!("math"))]).with_limit(10);
        let spec_b = QuerySpec::filtered(vec![Filter::eq("subject", json!("math"))]).with_limit(10);
        let spec_c = QuerySpec::filtered(vec![Filter::eq("subject", json!("bio"))]).with_limit(10);

        let hash_a = query_hash("exams", &spec_a).unwrap();
        let hash_b = query_hash("exams", &spec_b).unwrap();
        let hash_c = query_hash("exams", &spec_c).unwrap();
        let hash_d = query_hash("posts", &spec_a).unwrap();

        assert_eq!(hash_a, hash_b);
        assert_ne!(hash_a, hash_c);
        assert_ne!(hash_a, hash_d);
    }

    #[test]
    fn test_query_hash_distinguishes_pages() {
        // Two pages of the same query must never share a cache key.
        let page_one = QuerySpec::default().with_limit(10);
        let page_two = QuerySpec::default().with_limit(10).with_offset(10);
        assert_ne!(
            query_hash("exams", &page_one).unwrap(),
            query_hash("exams", &page_two).unwrap()
        );
    }
}
