//! Route assembly for the Schoolyard API.

pub mod documents;
pub mod health;

use axum::middleware::from_fn_with_state;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::middleware::{rate_limit_middleware, RateLimitState};
use crate::state::AppState;

/// Build the full application router.
///
/// Rate limiting is the outermost layer so throttled requests never reach a
/// handler; `/health` is exempt via the config allowlist.
pub fn create_router(state: AppState, config: ApiConfig) -> Router {
    let rate_limit_state = RateLimitState::new(config);

    Router::new()
        .nest("/api/collections", documents::create_router())
        .nest("/health", health::create_router())
        .with_state(state)
        .layer(from_fn_with_state(rate_limit_state, rate_limit_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
