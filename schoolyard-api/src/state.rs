//! Shared application state for Axum routers.

use schoolyard_store::DocumentStore;
use std::sync::Arc;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Cached document store over the configured backend.
    pub store: Arc<DocumentStore>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            store,
            start_time: std::time::Instant::now(),
        }
    }
}
