//! Schoolyard Core - Document Platform Data Types
//!
//! Pure data structures shared by every other crate: the document model,
//! the filter language, the error taxonomy, and configuration. No storage
//! or HTTP logic lives here.

pub mod config;
pub mod document;
pub mod error;
pub mod filter;

pub use config::StoreConfig;
pub use document::{
    merge_update, new_document_id, now_rfc3339, stamp_new, Document, CREATED_AT, UPDATED_AT,
};
pub use error::{
    CoreError, CoreResult, LimitScope, RateLimitError, StorageError, ValidationError,
};
pub use filter::{Filter, FilterOp, QuerySpec, SortOrder};
