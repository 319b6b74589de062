//! Sliding-window rate limiting middleware.
//!
//! Each client gets two windows: one minute and one hour. A request must fit
//! in both to pass. Denied requests are not recorded, so a client that keeps
//! retrying while over the limit doesn't push its own recovery further out.
//! Idle clients are swept out periodically to bound memory.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use schoolyard_core::{LimitScope, RateLimitError};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::ApiConfig;
use crate::error::ApiError;

// ============================================================================
// SLIDING WINDOW LIMITER
// ============================================================================

/// Request timestamps for one client, one Vec per window granularity.
#[derive(Debug, Default)]
struct ClientWindows {
    minute: Vec<Instant>,
    hour: Vec<Instant>,
}

/// Remaining quota after an allowed request, surfaced as response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitQuota {
    pub limit_minute: u32,
    pub remaining_minute: u32,
    pub limit_hour: u32,
    pub remaining_hour: u32,
}

/// Two-granularity sliding-window rate limiter, keyed by client id.
///
/// An owned component: construct one per server (or per test) rather than
/// sharing process-global state.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    // DashMap for lock-free concurrent access across request tasks.
    clients: DashMap<String, ClientWindows>,
    per_minute: u32,
    per_hour: u32,
    minute_window: Duration,
    hour_window: Duration,
    cleanup_interval: Duration,
    last_sweep: Mutex<Instant>,
}

impl SlidingWindowLimiter {
    /// Create a limiter from API configuration.
    pub fn new(config: &ApiConfig) -> Self {
        Self::with_windows(
            config.requests_per_minute,
            config.requests_per_hour,
            Duration::from_secs(60),
            Duration::from_secs(3600),
            config.cleanup_interval,
        )
    }

    /// Create a limiter with explicit window durations. Tests use short
    /// windows to exercise rollover without sleeping for real minutes.
    pub fn with_windows(
        per_minute: u32,
        per_hour: u32,
        minute_window: Duration,
        hour_window: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            clients: DashMap::new(),
            per_minute,
            per_hour,
            minute_window,
            hour_window,
            cleanup_interval,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Check whether a request from `client` is allowed right now.
    ///
    /// Allowed requests are recorded in both windows and return the remaining
    /// quota; denied requests are not recorded.
    pub fn check(&self, client: &str) -> Result<RateLimitQuota, RateLimitError> {
        let now = Instant::now();
        // Sweep before taking the client entry; both touch the map and
        // holding an entry across the sweep would deadlock.
        self.maybe_sweep(now);

        let mut windows = self.clients.entry(client.to_string()).or_default();
        let minute_cutoff = now.checked_sub(self.minute_window);
        let hour_cutoff = now.checked_sub(self.hour_window);
        prune(&mut windows.minute, minute_cutoff);
        prune(&mut windows.hour, hour_cutoff);

        if windows.minute.len() as u32 >= self.per_minute {
            return Err(RateLimitError::Exceeded {
                limit: self.per_minute,
                scope: LimitScope::Minute,
            });
        }
        if windows.hour.len() as u32 >= self.per_hour {
            return Err(RateLimitError::Exceeded {
                limit: self.per_hour,
                scope: LimitScope::Hour,
            });
        }

        windows.minute.push(now);
        windows.hour.push(now);
        Ok(RateLimitQuota {
            limit_minute: self.per_minute,
            remaining_minute: self.per_minute - windows.minute.len() as u32,
            limit_hour: self.per_hour,
            remaining_hour: self.per_hour - windows.hour.len() as u32,
        })
    }

    /// Number of clients currently tracked.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Drop clients whose hour window has fully drained, at most once per
    /// cleanup interval.
    fn maybe_sweep(&self, now: Instant) {
        {
            let mut last = self.last_sweep.lock().unwrap_or_else(|e| e.into_inner());
            if now.duration_since(*last) < self.cleanup_interval {
                return;
            }
            *last = now;
        }

        let hour_cutoff = now.checked_sub(self.hour_window);
        self.clients.retain(|_, windows| {
            prune(&mut windows.hour, hour_cutoff);
            !windows.hour.is_empty()
        });
        tracing::debug!(clients = self.clients.len(), "rate limiter swept");
    }
}

/// Drop timestamps at or before the cutoff. A `None` cutoff means the
/// process hasn't been alive for a full window yet; keep everything.
fn prune(window: &mut Vec<Instant>, cutoff: Option<Instant>) {
    if let Some(cutoff) = cutoff {
        window.retain(|t| *t > cutoff);
    }
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

/// State for the rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub config: Arc<ApiConfig>,
    pub limiter: Arc<SlidingWindowLimiter>,
}

impl RateLimitState {
    pub fn new(config: ApiConfig) -> Self {
        let limiter = Arc::new(SlidingWindowLimiter::new(&config));
        Self {
            config: Arc::new(config),
            limiter,
        }
    }
}

/// Identify the client: forwarded headers first (for proxied requests), then
/// the socket address, then a shared bucket for everything unidentifiable.
fn extract_client_id(request: &Request) -> String {
    if let Some(forwarded_for) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
    {
        // X-Forwarded-For can contain multiple IPs, take the first one
        if let Some(first_ip) = forwarded_for.split(',').next() {
            let first_ip = first_ip.trim();
            if !first_ip.is_empty() {
                return first_ip.to_string();
            }
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
    {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware.
///
/// Exempt paths pass straight through. Everything else is checked against
/// both windows; allowed responses carry `X-RateLimit-*` quota headers and
/// denials return 429 with a structured body.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    let path = request.uri().path();
    if state.config.exempt_paths.iter().any(|p| p == path) {
        return Ok(next.run(request).await);
    }

    let client = extract_client_id(&request);
    let quota = state.limiter.check(&client).map_err(|err| {
        tracing::warn!(client, "{}", err);
        ApiError::from(err)
    })?;

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("x-ratelimit-limit-minute"),
        u32_header(quota.limit_minute),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining-minute"),
        u32_header(quota.remaining_minute),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-limit-hour"),
        u32_header(quota.limit_hour),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining-hour"),
        u32_header(quota.remaining_hour),
    );
    Ok(response)
}

fn u32_header(value: u32) -> HeaderValue {
    HeaderValue::from_str(&value.to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("0"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt; // for `oneshot`

    fn tiny_limiter(per_minute: u32, per_hour: u32) -> SlidingWindowLimiter {
        SlidingWindowLimiter::with_windows(
            per_minute,
            per_hour,
            Duration::from_millis(50),
            Duration::from_millis(200),
            Duration::from_secs(300),
        )
    }

    #[test]
    fn test_allows_up_to_minute_limit_then_denies() {
        let limiter = tiny_limiter(3, 100);
        for _ in 0..3 {
            assert!(limiter.check("1.2.3.4").is_ok());
        }
        let denied = limiter.check("1.2.3.4");
        assert!(matches!(
            denied,
            Err(RateLimitError::Exceeded {
                limit: 3,
                scope: LimitScope::Minute,
            })
        ));
    }

    #[test]
    fn test_remaining_counts_down() {
        let limiter = tiny_limiter(3, 100);
        let quota = limiter.check("c").unwrap();
        assert_eq!(quota.remaining_minute, 2);
        let quota = limiter.check("c").unwrap();
        assert_eq!(quota.remaining_minute, 1);
        assert_eq!(quota.limit_hour, 100);
        assert_eq!(quota.remaining_hour, 98);
    }

    #[test]
    fn test_clients_are_isolated() {
        let limiter = tiny_limiter(1, 100);
        assert!(limiter.check("alice").is_ok());
        assert!(limiter.check("alice").is_err());
        assert!(limiter.check("bob").is_ok());
    }

    #[test]
    fn test_window_rollover_readmits() {
        let limiter = tiny_limiter(2, 100);
        assert!(limiter.check("c").is_ok());
        assert!(limiter.check("c").is_ok());
        assert!(limiter.check("c").is_err());

        std::thread::sleep(Duration::from_millis(70));
        assert!(limiter.check("c").is_ok());
    }

    #[test]
    fn test_denied_requests_are_not_recorded() {
        let limiter = tiny_limiter(2, 100);
        limiter.check("c").unwrap();
        limiter.check("c").unwrap();

        // Hammering while denied must not extend the lockout.
        for _ in 0..10 {
            assert!(limiter.check("c").is_err());
        }
        std::thread::sleep(Duration::from_millis(70));
        assert!(limiter.check("c").is_ok());
    }

    #[test]
    fn test_hour_limit_applies_after_minute_rollover() {
        let limiter = tiny_limiter(2, 3);
        limiter.check("c").unwrap();
        limiter.check("c").unwrap();

        std::thread::sleep(Duration::from_millis(70));
        limiter.check("c").unwrap();
        let denied = limiter.check("c");
        assert!(matches!(
            denied,
            Err(RateLimitError::Exceeded {
                scope: LimitScope::Hour,
                ..
            })
        ));
    }

    #[test]
    fn test_sweep_drops_idle_clients() {
        let limiter = SlidingWindowLimiter::with_windows(
            10,
            100,
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(30),
        );
        limiter.check("idle").unwrap();
        assert_eq!(limiter.client_count(), 1);

        std::thread::sleep(Duration::from_millis(40));
        // Any check after the cleanup interval triggers the sweep.
        limiter.check("active").unwrap();
        assert_eq!(limiter.client_count(), 1);
    }

    fn test_router(state: RateLimitState) -> Router {
        Router::new()
            .route("/api/ping", get(|| async { "pong" }))
            .route("/health", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                state,
                rate_limit_middleware,
            ))
    }

    fn request(path: &str, client: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .uri(path)
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn test_middleware_denies_over_limit_with_429() {
        let state = RateLimitState::new(ApiConfig {
            requests_per_minute: 2,
            ..ApiConfig::default()
        });
        let app = test_router(state);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request("/api/ping", "9.9.9.9"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(request("/api/ping", "9.9.9.9"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_middleware_sets_quota_headers() {
        let state = RateLimitState::new(ApiConfig::default());
        let app = test_router(state);

        let response = app
            .oneshot(request("/api/ping", "9.9.9.9"))
            .await
            .unwrap();
        let headers = response.headers();
        assert_eq!(headers["x-ratelimit-limit-minute"], "60");
        assert_eq!(headers["x-ratelimit-remaining-minute"], "59");
        assert_eq!(headers["x-ratelimit-limit-hour"], "1000");
        assert_eq!(headers["x-ratelimit-remaining-hour"], "999");
    }

    #[tokio::test]
    async fn test_exempt_path_bypasses_limiter() {
        let state = RateLimitState::new(ApiConfig {
            requests_per_minute: 1,
            ..ApiConfig::default()
        });
        let app = test_router(state);

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(request("/health", "9.9.9.9"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(!response.headers().contains_key("x-ratelimit-limit-minute"));
        }
    }

    #[tokio::test]
    async fn test_disabled_limiter_passes_everything() {
        let state = RateLimitState::new(ApiConfig {
            rate_limit_enabled: false,
            requests_per_minute: 1,
            ..ApiConfig::default()
        });
        let app = test_router(state);

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(request("/api/ping", "9.9.9.9"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[test]
    fn test_client_id_prefers_forwarded_header() {
        let request = HttpRequest::builder()
            .uri("/api/ping")
            .header("x-forwarded-for", "10.0.0.1, 10.0.0.2")
            .header("x-real-ip", "10.0.0.3")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_client_id(&request), "10.0.0.1");
    }

    #[test]
    fn test_client_id_falls_back_to_unknown() {
        let request = HttpRequest::builder()
            .uri("/api/ping")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_client_id(&request), "unknown");
    }
}
