//! Schoolyard Store - Document Store, Cache, and Backends
//!
//! Defines the backend abstraction for schemaless document collections, the
//! in-memory backend used by tests and development, the PostgreSQL production
//! backend, and the `DocumentStore` wrapper that adds read-through caching
//! with whole-collection invalidation on writes.

pub mod backend;
pub mod cache;
pub mod memory;
pub mod pg;
pub mod store;

pub use backend::{CollectionStats, DocumentBackend, DEFAULT_SEARCH_FIELDS};
pub use cache::{doc_key, query_key, CacheStats, CachedValue, QueryCache};
pub use memory::MemoryBackend;
pub use pg::{PgBackend, PgConfig};
pub use store::DocumentStore;
