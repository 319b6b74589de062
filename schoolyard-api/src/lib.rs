//! Schoolyard API - HTTP Server
//!
//! Axum HTTP surface over the document store: CRUD, query, count, search,
//! batch, and stats endpoints per collection, plus a health probe. Requests
//! pass through sliding-window rate limiting before reaching any handler.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_router;
pub use state::AppState;
