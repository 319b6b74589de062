//! Schoolyard API Server Entry Point
//!
//! Bootstraps configuration, selects the storage backend, and starts the
//! Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use schoolyard_api::{create_router, ApiConfig, ApiError, ApiResult, AppState};
use schoolyard_core::StoreConfig;
use schoolyard_store::{DocumentBackend, DocumentStore, MemoryBackend, PgBackend, PgConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ApiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let backend = resolve_backend().await?;
    let store = Arc::new(DocumentStore::new(backend, &StoreConfig::from_env()));

    let api_config = ApiConfig::from_env();
    let addr = resolve_bind_addr(&api_config)?;
    let app = create_router(AppState::new(store), api_config);

    tracing::info!(%addr, "starting schoolyard API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal(format!("failed to bind {}: {}", addr, e)))?;

    // ConnectInfo gives the rate limiter a socket address to fall back on
    // when no forwarding headers are present.
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal(format!("server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}

/// Pick the storage backend from `SCHOOLYARD_BACKEND` (memory | postgres).
async fn resolve_backend() -> ApiResult<Arc<dyn DocumentBackend>> {
    let choice =
        std::env::var("SCHOOLYARD_BACKEND").unwrap_or_else(|_| "postgres".to_string());
    match choice.as_str() {
        "memory" => {
            tracing::warn!("using in-memory backend; data will not survive restarts");
            Ok(Arc::new(MemoryBackend::new()))
        }
        "postgres" => {
            let backend = PgBackend::from_config(&PgConfig::from_env())?;
            backend.init_schema().await?;
            Ok(Arc::new(backend))
        }
        other => Err(ApiError::validation(format!(
            "unknown backend '{}', expected 'memory' or 'postgres'",
            other
        ))),
    }
}

fn resolve_bind_addr(config: &ApiConfig) -> ApiResult<SocketAddr> {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(config.port);
    let addr = format!("{}:{}", config.host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::validation(format!("invalid bind address {}: {}", addr, e)))
}
