//! The document store: a backend plus a query cache.
//!
//! Reads consult the cache first; every write invalidates the affected
//! collection's cache entries after the backend commit, so invalidation wins
//! over TTL. Only bounded queries at or under the configured limit are
//! cached; unbounded queries always go to the backend.

use schoolyard_core::{CoreResult, Document, Filter, QuerySpec, StoreConfig};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::backend::{CollectionStats, DocumentBackend, DEFAULT_SEARCH_FIELDS};
use crate::cache::{doc_key, query_hash, query_key, CacheStats, CachedValue, QueryCache};

/// Default number of results returned by `search` when the caller doesn't cap it.
pub const DEFAULT_SEARCH_LIMIT: u64 = 50;

/// Document store over a pluggable backend, with read-through caching.
pub struct DocumentStore {
    backend: Arc<dyn DocumentBackend>,
    cache: QueryCache,
    cacheable_query_limit: u64,
}

impl DocumentStore {
    /// Create a store over the given backend.
    pub fn new(backend: Arc<dyn DocumentBackend>, config: &StoreConfig) -> Self {
        Self {
            backend,
            cache: QueryCache::new(config.cache_ttl, config.cache_capacity),
            cacheable_query_limit: config.cacheable_query_limit,
        }
    }

    /// Insert a new document, returning the resolved id.
    pub async fn create(
        &self,
        collection: &str,
        data: Map<String, Value>,
        id: Option<String>,
    ) -> CoreResult<String> {
        let id = self.backend.create(collection, data, id).await?;
        self.cache.invalidate_collection(collection);
        tracing::debug!(collection, id, "document created");
        Ok(id)
    }

    /// Read a document, consulting the cache first.
    pub async fn read(&self, collection: &str, id: &str) -> CoreResult<Option<Document>> {
        let key = doc_key(collection, id);
        if let Some(CachedValue::Document(doc)) = self.cache.get(&key) {
            return Ok(Some(doc));
        }

        let result = self.backend.read(collection, id).await?;
        if let Some(doc) = &result {
            self.cache.put(key, CachedValue::Document(doc.clone()));
        }
        Ok(result)
    }

    /// Shallow-merge a partial update; returns whether the target existed.
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        partial: Map<String, Value>,
    ) -> CoreResult<bool> {
        let existed = self.backend.update(collection, id, partial).await?;
        if existed {
            self.cache.invalidate_collection(collection);
            tracing::debug!(collection, id, "document updated");
        }
        Ok(existed)
    }

    /// Remove a document permanently; returns whether it existed.
    pub async fn delete(&self, collection: &str, id: &str) -> CoreResult<bool> {
        let existed = self.backend.delete(collection, id).await?;
        if existed {
            self.cache.invalidate_collection(collection);
            tracing::debug!(collection, id, "document deleted");
        }
        Ok(existed)
    }

    /// Run a filtered query, caching bounded results.
    pub async fn query(&self, collection: &str, spec: &QuerySpec) -> CoreResult<Vec<Document>> {
        let cacheable = spec
            .limit
            .map(|limit| limit <= self.cacheable_query_limit)
            .unwrap_or(false);

        let key = if cacheable {
            let key = query_key(collection, &query_hash(collection, spec)?);
            if let Some(CachedValue::List(docs)) = self.cache.get(&key) {
                return Ok(docs);
            }
            Some(key)
        } else {
            None
        };

        let result = self.backend.query(collection, spec).await?;
        if let Some(key) = key {
            self.cache.put(key, CachedValue::List(result.clone()));
        }
        Ok(result)
    }

    /// Every document in a collection. Use with caution on large collections.
    pub async fn get_all(&self, collection: &str) -> CoreResult<Vec<Document>> {
        self.query(collection, &QuerySpec::default()).await
    }

    /// Count documents matching the filters. Not cached.
    pub async fn count(&self, collection: &str, filters: &[Filter]) -> CoreResult<u64> {
        self.backend.count(collection, filters).await
    }

    /// Substring search over top-level string fields. Not cached.
    ///
    /// Falls back to the default field set (`content`, `title`, `name`) and
    /// the default limit when the caller leaves them out.
    pub async fn search(
        &self,
        collection: &str,
        term: &str,
        fields: Option<Vec<String>>,
        limit: Option<u64>,
    ) -> CoreResult<Vec<Document>> {
        let fields = fields.unwrap_or_else(|| {
            DEFAULT_SEARCH_FIELDS.iter().map(|s| s.to_string()).collect()
        });
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        self.backend.search(collection, term, &fields, limit).await
    }

    /// Create many documents in one transaction; one invalidation at the end.
    pub async fn batch_create(
        &self,
        collection: &str,
        documents: Vec<Map<String, Value>>,
    ) -> CoreResult<Vec<String>> {
        let ids = self.backend.batch_create(collection, documents).await?;
        self.cache.invalidate_collection(collection);
        tracing::debug!(collection, count = ids.len(), "batch create");
        Ok(ids)
    }

    /// Apply many partial updates in one transaction; one invalidation at the
    /// end when anything changed.
    pub async fn batch_update(
        &self,
        collection: &str,
        updates: Vec<(String, Map<String, Value>)>,
    ) -> CoreResult<u64> {
        let updated = self.backend.batch_update(collection, updates).await?;
        if updated > 0 {
            self.cache.invalidate_collection(collection);
            tracing::debug!(collection, updated, "batch update");
        }
        Ok(updated)
    }

    /// True iff the backend answers a trivial probe.
    pub async fn health_check(&self) -> CoreResult<bool> {
        self.backend.health_check().await
    }

    /// Collection statistics.
    pub async fn stats(&self, collection: &str) -> CoreResult<CollectionStats> {
        self.backend.stats(collection).await
    }

    /// Cache counters, for diagnostics endpoints and tests.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Manually clear cached entries for one collection.
    pub fn clear_cache(&self, collection: &str) {
        self.cache.invalidate_collection(collection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use schoolyard_core::SortOrder;
    use serde_json::json;
    use std::time::Duration;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().expect("object literal").clone()
    }

    fn store() -> DocumentStore {
        DocumentStore::new(Arc::new(MemoryBackend::new()), &StoreConfig::default())
    }

    fn store_with(config: StoreConfig) -> DocumentStore {
        DocumentStore::new(Arc::new(MemoryBackend::new()), &config)
    }

    #[tokio::test]
    async fn test_read_is_cached_until_write() {
        let store = store();
        let id = store
            .create("posts", map(json!({"title": "Photosynthesis"})), None)
            .await
            .unwrap();

        // First read misses, second hits.
        store.read("posts", &id).await.unwrap().unwrap();
        store.read("posts", &id).await.unwrap().unwrap();
        let stats = store.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_update_invalidates_before_ttl_expiry() {
        // TTL far in the future: only invalidation can explain a fresh read.
        let store = store_with(StoreConfig {
            cache_ttl: Duration::from_secs(3600),
            ..StoreConfig::default()
        });
        let id = store
            .create("posts", map(json!({"title": "v1"})), None)
            .await
            .unwrap();
        store.read("posts", &id).await.unwrap();

        store
            .update("posts", &id, map(json!({"title": "v2"})))
            .await
            .unwrap();

        let doc = store.read("posts", &id).await.unwrap().unwrap();
        assert_eq!(doc.get("title"), Some(&json!("v2")));
    }

    #[tokio::test]
    async fn test_delete_invalidates_cached_read() {
        let store = store();
        let id = store.create("posts", map(json!({})), None).await.unwrap();
        store.read("posts", &id).await.unwrap();

        assert!(store.delete("posts", &id).await.unwrap());
        assert!(store.read("posts", &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_invalidates_cached_query() {
        let store = store_with(StoreConfig {
            cache_ttl: Duration::from_secs(3600),
            ..StoreConfig::default()
        });
        store
            .create("exams", map(json!({"subject": "math"})), None)
            .await
            .unwrap();

        let spec = QuerySpec::filtered(vec![Filter::eq("subject", json!("math"))]).with_limit(10);
        assert_eq!(store.query("exams", &spec).await.unwrap().len(), 1);

        store
            .create("exams", map(json!({"subject": "math"})), None)
            .await
            .unwrap();
        assert_eq!(store.query("exams", &spec).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cache_ttl_expiry_recomputes() {
        let store = store_with(StoreConfig {
            cache_ttl: Duration::from_millis(20),
            ..StoreConfig::default()
        });
        let id = store.create("posts", map(json!({})), None).await.unwrap();

        store.read("posts", &id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        store.read("posts", &id).await.unwrap();

        let stats = store.cache_stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn test_unbounded_and_oversized_queries_bypass_cache() {
        let store = store();
        store.create("posts", map(json!({})), None).await.unwrap();

        store.query("posts", &QuerySpec::default()).await.unwrap();
        store
            .query("posts", &QuerySpec::default().with_limit(101))
            .await
            .unwrap();

        // Writes invalidated the read cache; nothing was stored for queries.
        let stats = store.cache_stats();
        assert_eq!(stats.entry_count, 0);

        store
            .query("posts", &QuerySpec::default().with_limit(100))
            .await
            .unwrap();
        assert_eq!(store.cache_stats().entry_count, 1);
    }

    #[tokio::test]
    async fn test_query_cache_hit_returns_same_rows() {
        let store = store();
        for subject in ["math", "bio"] {
            store
                .create("exams", map(json!({"subject": subject})), None)
                .await
                .unwrap();
        }

        let spec = QuerySpec::filtered(vec![Filter::eq("subject", json!("bio"))])
            .order_by("subject", SortOrder::Asc)
            .with_limit(10);
        let first = store.query("exams", &spec).await.unwrap();
        let second = store.query("exams", &spec).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_count_matches_query_len() {
        let store = store();
        for subject in ["math", "bio", "math"] {
            store
                .create("exams", map(json!({"subject": subject})), None)
                .await
                .unwrap();
        }

        let filters = vec![Filter::eq("subject", json!("math"))];
        let count = store.count("exams", &filters).await.unwrap();
        let rows = store
            .query("exams", &QuerySpec::filtered(filters))
            .await
            .unwrap();
        assert_eq!(count, rows.len() as u64);
    }

    #[tokio::test]
    async fn test_search_uses_default_fields_and_limit() {
        let store = store();
        store
            .create("posts", map(json!({"title": "Trig Identities"})), None)
            .await
            .unwrap();

        let hits = store.search("posts", "trig", None, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_ops_share_invalidation() {
        let store = store_with(StoreConfig {
            cache_ttl: Duration::from_secs(3600),
            ..StoreConfig::default()
        });
        let ids = store
            .batch_create("posts", vec![map(json!({"n": 1})), map(json!({"n": 2}))])
            .await
            .unwrap();

        let spec = QuerySpec::default().with_limit(10);
        assert_eq!(store.query("posts", &spec).await.unwrap().len(), 2);

        let updated = store
            .batch_update("posts", vec![(ids[0].clone(), map(json!({"n": 7})))])
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let rows = store.query("posts", &spec).await.unwrap();
        let doc = rows.iter().find(|d| d.id == ids[0]).unwrap();
        assert_eq!(doc.get("n"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn test_health_and_stats_pass_through() {
        let store = store();
        assert!(store.health_check().await.unwrap());

        store.create("posts", map(json!({})), None).await.unwrap();
        let stats = store.stats("posts").await.unwrap();
        assert_eq!(stats.total_documents, 1);
    }
}
