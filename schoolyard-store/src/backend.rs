//! Backend trait for document collections.
//!
//! A backend maps `(collection, id)` to an open JSON payload and answers
//! filtered queries. Two implementations exist: `MemoryBackend` for tests and
//! development, `PgBackend` for production. The filter language defined in
//! `schoolyard-core` is the stable contract surface between them.

use async_trait::async_trait;
use schoolyard_core::{CoreResult, Document, Filter, QuerySpec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields searched when the caller doesn't name any.
pub const DEFAULT_SEARCH_FIELDS: [&str; 3] = ["content", "title", "name"];

/// Async backend trait for document collection operations.
///
/// Implementations must apply the shared document semantics: timestamps are
/// stamped with `stamp_new` at create, updates go through `merge_update`, and
/// a document's collection is immutable after creation.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Insert a new document, returning the resolved id.
    ///
    /// When `id` is `None` a random one is generated. A duplicate
    /// `(collection, id)` pair is an error, never a silent overwrite.
    async fn create(
        &self,
        collection: &str,
        data: Map<String, Value>,
        id: Option<String>,
    ) -> CoreResult<String>;

    /// Read a document by id.
    async fn read(&self, collection: &str, id: &str) -> CoreResult<Option<Document>>;

    /// Shallow-merge a partial update over an existing document.
    ///
    /// Returns whether the target existed; absent targets are not an error.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        partial: Map<String, Value>,
    ) -> CoreResult<bool>;

    /// Remove a document permanently. Returns whether it existed.
    async fn delete(&self, collection: &str, id: &str) -> CoreResult<bool>;

    /// Run a filtered, ordered, paginated query.
    async fn query(&self, collection: &str, spec: &QuerySpec) -> CoreResult<Vec<Document>>;

    /// Count documents matching the filters, same semantics as `query`.
    async fn count(&self, collection: &str, filters: &[Filter]) -> CoreResult<u64>;

    /// Case-insensitive substring search across the given top-level string
    /// fields, ORed together, newest (`updatedAt`) first.
    async fn search(
        &self,
        collection: &str,
        term: &str,
        fields: &[String],
        limit: u64,
    ) -> CoreResult<Vec<Document>>;

    /// Create many documents in one storage transaction.
    async fn batch_create(
        &self,
        collection: &str,
        documents: Vec<Map<String, Value>>,
    ) -> CoreResult<Vec<String>>;

    /// Apply many partial updates in one storage transaction.
    ///
    /// Missing targets are skipped; returns the number actually updated.
    async fn batch_update(
        &self,
        collection: &str,
        updates: Vec<(String, Map<String, Value>)>,
    ) -> CoreResult<u64>;

    /// True iff a trivial count probe succeeds.
    async fn health_check(&self) -> CoreResult<bool>;

    /// Collection statistics for diagnostics.
    async fn stats(&self, collection: &str) -> CoreResult<CollectionStats>;
}

/// Statistics about one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub collection: String,
    pub total_documents: u64,
    /// RFC 3339 creation time of the oldest document, if any exist.
    pub oldest_document: Option<String>,
    /// RFC 3339 creation time of the newest document, if any exist.
    pub newest_document: Option<String>,
}

/// Textual form of a JSON value for substring and LIKE comparisons.
///
/// Strings compare by their content, not their JSON quoting; everything else
/// uses its compact JSON form.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
