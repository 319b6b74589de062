//! In-memory backend.
//!
//! Keeps every collection as a map of id to payload behind one `RwLock`.
//! Used by tests and single-process development; filters are evaluated
//! directly against `serde_json::Value` with the same semantics the SQL
//! backend compiles to predicates.

use async_trait::async_trait;
use schoolyard_core::{
    merge_update, new_document_id, now_rfc3339, stamp_new, CoreResult, Document, Filter, FilterOp,
    QuerySpec, SortOrder, StorageError, CREATED_AT, UPDATED_AT,
};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backend::{value_text, CollectionStats, DocumentBackend};

type Collections = HashMap<String, BTreeMap<String, Map<String, Value>>>;

/// In-memory document backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: Arc<RwLock<Collections>>,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.write().clear();
    }

    // A poisoned lock only means another thread panicked mid-operation on an
    // unrelated key; the map itself is still structurally sound, so recover.
    fn read_guard(&self) -> RwLockReadGuard<'_, Collections> {
        self.collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.collections
            .write()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Whether a payload satisfies one filter clause.
///
/// A missing field fails every operator, matching SQL NULL comparison
/// semantics in the production backend.
fn matches(data: &Map<String, Value>, filter: &Filter) -> bool {
    let Some(actual) = data.get(&filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => actual == &filter.value,
        FilterOp::Ne => actual != &filter.value,
        FilterOp::Lt => compare(actual, &filter.value) == Some(Ordering::Less),
        FilterOp::Lte => matches!(
            compare(actual, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::Gt => compare(actual, &filter.value) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(
            compare(actual, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::In => filter
            .value
            .as_array()
            .map(|candidates| candidates.contains(actual))
            .unwrap_or(false),
        FilterOp::Contains => actual
            .as_str()
            .map(|s| s.contains(&value_text(&filter.value)))
            .unwrap_or(false),
    }
}

/// Order two JSON values of the same kind; mismatched kinds don't compare.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Sort documents by a top-level field; absent values sort first ascending.
fn sort_by_field(docs: &mut [Document], field: &str, order: SortOrder) {
    docs.sort_by(|a, b| {
        let ordering = match (a.data.get(field), b.data.get(field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
        };
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn create(
        &self,
        collection: &str,
        mut data: Map<String, Value>,
        id: Option<String>,
    ) -> CoreResult<String> {
        let id = id.unwrap_or_else(new_document_id);
        stamp_new(&mut data, &now_rfc3339());

        let mut collections = self.write();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(&id) {
            return Err(StorageError::Duplicate {
                collection: collection.to_string(),
                id,
            }
            .into());
        }
        docs.insert(id.clone(), data);
        Ok(id)
    }

    async fn read(&self, collection: &str, id: &str) -> CoreResult<Option<Document>> {
        let collections = self.read_guard();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        partial: Map<String, Value>,
    ) -> CoreResult<bool> {
        let mut collections = self.write();
        let Some(data) = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
        else {
            return Ok(false);
        };
        merge_update(data, partial, &now_rfc3339());
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> CoreResult<bool> {
        let mut collections = self.write();
        Ok(collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some())
    }

    async fn query(&self, collection: &str, spec: &QuerySpec) -> CoreResult<Vec<Document>> {
        let collections = self.read_guard();
        let mut result: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| spec.filters.iter().all(|f| matches(data, f)))
                    .map(|(id, data)| Document::new(id, data.clone()))
                    .collect()
            })
            .unwrap_or_default();
        drop(collections);

        let order_field = spec.order_by.as_deref().unwrap_or(CREATED_AT);
        sort_by_field(&mut result, order_field, spec.order);

        let offset = spec.offset.unwrap_or(0) as usize;
        let result: Vec<Document> = match spec.limit {
            Some(limit) => result.into_iter().skip(offset).take(limit as usize).collect(),
            None => result.into_iter().skip(offset).collect(),
        };
        Ok(result)
    }

    async fn count(&self, collection: &str, filters: &[Filter]) -> CoreResult<u64> {
        let collections = self.read_guard();
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|data| filters.iter().all(|f| matches(data, f)))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn search(
        &self,
        collection: &str,
        term: &str,
        fields: &[String],
        limit: u64,
    ) -> CoreResult<Vec<Document>> {
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let needle = term.to_lowercase();

        let collections = self.read_guard();
        let mut result: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| {
                        fields.iter().any(|field| {
                            data.get(field)
                                .and_then(Value::as_str)
                                .map(|s| s.to_lowercase().contains(&needle))
                                .unwrap_or(false)
                        })
                    })
                    .map(|(id, data)| Document::new(id, data.clone()))
                    .collect()
            })
            .unwrap_or_default();
        drop(collections);

        sort_by_field(&mut result, UPDATED_AT, SortOrder::Desc);
        result.truncate(limit as usize);
        Ok(result)
    }

    async fn batch_create(
        &self,
        collection: &str,
        documents: Vec<Map<String, Value>>,
    ) -> CoreResult<Vec<String>> {
        let now = now_rfc3339();
        let mut collections = self.write();
        let docs = collections.entry(collection.to_string()).or_default();

        let mut ids = Vec::with_capacity(documents.len());
        for mut data in documents {
            let id = new_document_id();
            stamp_new(&mut data, &now);
            docs.insert(id.clone(), data);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn batch_update(
        &self,
        collection: &str,
        updates: Vec<(String, Map<String, Value>)>,
    ) -> CoreResult<u64> {
        let now = now_rfc3339();
        let mut collections = self.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut updated = 0;
        for (id, partial) in updates {
            if let Some(data) = docs.get_mut(&id) {
                merge_update(data, partial, &now);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn health_check(&self) -> CoreResult<bool> {
        Ok(true)
    }

    async fn stats(&self, collection: &str) -> CoreResult<CollectionStats> {
        let collections = self.read_guard();
        let docs = collections.get(collection);

        let total = docs.map(|d| d.len() as u64).unwrap_or(0);
        let created: Vec<&str> = docs
            .map(|d| {
                d.values()
                    .filter_map(|data| data.get(CREATED_AT).and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        Ok(CollectionStats {
            collection: collection.to_string(),
            total_documents: total,
            oldest_document: created.iter().min().map(|s| s.to_string()),
            newest_document: created.iter().max().map(|s| s.to_string()),
        })
    }
}
