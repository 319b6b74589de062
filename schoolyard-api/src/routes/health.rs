//! Health Check Endpoint
//!
//! `GET /health` reports process liveness plus a backend connectivity probe.
//! No authentication or rate limiting applies here.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub backend: ComponentHealth,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let backend = match state.store.health_check().await {
        Ok(true) => ComponentHealth {
            status: HealthStatus::Healthy,
            error: None,
        },
        Ok(false) => ComponentHealth {
            status: HealthStatus::Unhealthy,
            error: Some("backend probe returned false".to_string()),
        },
        Err(e) => ComponentHealth {
            status: HealthStatus::Unhealthy,
            error: Some(e.to_string()),
        },
    };

    let status = backend.status;
    let body = HealthResponse {
        status,
        backend,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };
    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(body))
}
