//! API Configuration Module
//!
//! This module provides configuration for the HTTP server and rate limiting.
//! Configuration is loaded from environment variables with sensible defaults
//! for development.

use std::time::Duration;

/// API configuration for the HTTP server and rate limiting.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind host for the HTTP server.
    pub host: String,

    /// Bind port for the HTTP server.
    pub port: u16,

    /// Whether rate limiting is enabled.
    pub rate_limit_enabled: bool,

    /// Requests allowed per client per minute.
    pub requests_per_minute: u32,

    /// Requests allowed per client per hour.
    pub requests_per_hour: u32,

    /// How often idle clients are swept out of the limiter.
    pub cleanup_interval: Duration,

    /// Exact paths exempt from rate limiting.
    pub exempt_paths: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            rate_limit_enabled: true,
            requests_per_minute: 60,
            requests_per_hour: 1000,
            cleanup_interval: Duration::from_secs(300),
            exempt_paths: ["/", "/health", "/docs", "/openapi.json", "/redoc"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SCHOOLYARD_HOST`: Bind host (default: 0.0.0.0)
    /// - `SCHOOLYARD_PORT`: Bind port (default: 8000)
    /// - `SCHOOLYARD_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `SCHOOLYARD_RATE_LIMIT_PER_MINUTE`: Requests per minute per client (default: 60)
    /// - `SCHOOLYARD_RATE_LIMIT_PER_HOUR`: Requests per hour per client (default: 1000)
    /// - `SCHOOLYARD_RATE_LIMIT_CLEANUP_SECS`: Idle client sweep interval (default: 300)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("SCHOOLYARD_HOST").unwrap_or(defaults.host),
            port: std::env::var("SCHOOLYARD_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            rate_limit_enabled: std::env::var("SCHOOLYARD_RATE_LIMIT_ENABLED")
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(defaults.rate_limit_enabled),
            requests_per_minute: std::env::var("SCHOOLYARD_RATE_LIMIT_PER_MINUTE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.requests_per_minute),
            requests_per_hour: std::env::var("SCHOOLYARD_RATE_LIMIT_PER_HOUR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.requests_per_hour),
            cleanup_interval: Duration::from_secs(
                std::env::var("SCHOOLYARD_RATE_LIMIT_CLEANUP_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            exempt_paths: defaults.exempt_paths,
        }
    }
}
