//! Document model for schemaless collections.
//!
//! A document is an open JSON object identified by a string id within a named
//! collection. Two reserved top-level fields, `createdAt` and `updatedAt`,
//! carry RFC 3339 timestamps: both are stamped at creation (unless the caller
//! already supplied them) and `updatedAt` is overwritten on every update.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Reserved creation-timestamp field, set once at create.
pub const CREATED_AT: &str = "createdAt";

/// Reserved modification-timestamp field, refreshed on every update.
pub const UPDATED_AT: &str = "updatedAt";

/// Current time as an RFC 3339 string, the wire form of both reserved fields.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Generate a random document id (UUIDv4) for callers that don't supply one.
pub fn new_document_id() -> String {
    Uuid::new_v4().to_string()
}

/// One JSON-object record within a collection.
///
/// Serializes flat: `{ "id": "...", ...payload }`. The payload map never
/// contains an `id` key of its own; the id lives only in the `id` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier within the owning collection.
    pub id: String,
    /// Open payload, top-level string keys to arbitrary JSON values.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Document {
    /// Create a document from an id and payload map.
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self { id: id.into(), data }
    }

    /// Look up a top-level payload field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// The document's `createdAt` timestamp, when present and a string.
    pub fn created_at(&self) -> Option<&str> {
        self.data.get(CREATED_AT).and_then(Value::as_str)
    }

    /// The document's `updatedAt` timestamp, when present and a string.
    pub fn updated_at(&self) -> Option<&str> {
        self.data.get(UPDATED_AT).and_then(Value::as_str)
    }
}

/// Stamp a freshly created payload with the reserved timestamp fields.
///
/// Caller-supplied values win: the fields are only inserted when absent.
pub fn stamp_new(data: &mut Map<String, Value>, now: &str) {
    data.entry(CREATED_AT.to_string())
        .or_insert_with(|| Value::String(now.to_string()));
    data.entry(UPDATED_AT.to_string())
        .or_insert_with(|| Value::String(now.to_string()));
}

/// Shallow-merge a partial update over an existing payload.
///
/// Only the top-level keys present in `partial` are replaced; everything else
/// is untouched. `updatedAt` is then overwritten unconditionally, so an
/// attempt to smuggle a stale `updatedAt` through the partial loses. An `id`
/// key in the partial is dropped: the id is not part of the payload.
pub fn merge_update(existing: &mut Map<String, Value>, partial: Map<String, Value>, now: &str) {
    for (key, value) in partial {
        if key == "id" {
            continue;
        }
        existing.insert(key, value);
    }
    existing.insert(
        UPDATED_AT.to_string(),
        Value::String(now.to_string()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().expect("object literal").clone()
    }

    #[test]
    fn test_stamp_new_sets_both_timestamps() {
        let mut data = map(json!({"title": "Limits"}));
        stamp_new(&mut data, "2026-01-01T00:00:00Z");
        assert_eq!(data[CREATED_AT], json!("2026-01-01T00:00:00Z"));
        assert_eq!(data[UPDATED_AT], json!("2026-01-01T00:00:00Z"));
        assert_eq!(data["title"], json!("Limits"));
    }

    #[test]
    fn test_stamp_new_preserves_caller_timestamps() {
        let mut data = map(json!({"createdAt": "2020-05-05T00:00:00Z"}));
        stamp_new(&mut data, "2026-01-01T00:00:00Z");
        assert_eq!(data[CREATED_AT], json!("2020-05-05T00:00:00Z"));
        assert_eq!(data[UPDATED_AT], json!("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn test_merge_update_is_shallow() {
        let mut existing = map(json!({"a": 0, "b": 2, "createdAt": "2020-01-01T00:00:00Z"}));
        merge_update(&mut existing, map(json!({"a": 1})), "2026-01-01T00:00:00Z");
        assert_eq!(existing["a"], json!(1));
        assert_eq!(existing["b"], json!(2));
        assert_eq!(existing[CREATED_AT], json!("2020-01-01T00:00:00Z"));
        assert_eq!(existing[UPDATED_AT], json!("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn test_merge_update_drops_id_key() {
        let mut existing = map(json!({"a": 1}));
        merge_update(&mut existing, map(json!({"id": "sneaky"})), "2026-01-01T00:00:00Z");
        assert!(!existing.contains_key("id"));
    }

    #[test]
    fn test_document_serializes_flat() {
        let doc = Document::new("d1", map(json!({"subject": "math"})));
        let wire = serde_json::to_value(&doc).unwrap();
        assert_eq!(wire, json!({"id": "d1", "subject": "math"}));
    }

    #[test]
    fn test_document_deserializes_flat() {
        let doc: Document = serde_json::from_value(json!({"id": "d2", "x": 5})).unwrap();
        assert_eq!(doc.id, "d2");
        assert_eq!(doc.get("x"), Some(&json!(5)));
    }

    proptest! {
        #[test]
        fn prop_merge_keeps_disjoint_keys_and_applies_partial(
            base in proptest::collection::hash_map("[a-m]{1,4}", 0i64..100, 0..6),
            patch in proptest::collection::hash_map("[n-z]{1,4}", 0i64..100, 0..6),
        ) {
            let mut existing: Map<String, Value> = base
                .iter()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();
            let partial: Map<String, Value> = patch
                .iter()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();

            merge_update(&mut existing, partial, "2026-01-01T00:00:00Z");

            for (k, v) in &base {
                prop_assert_eq!(&existing[k], &json!(v));
            }
            for (k, v) in &patch {
                prop_assert_eq!(&existing[k], &json!(v));
            }
            prop_assert_eq!(&existing[UPDATED_AT], &json!("2026-01-01T00:00:00Z"));
        }
    }
}
