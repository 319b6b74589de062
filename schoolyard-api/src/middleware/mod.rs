//! Middleware for the Schoolyard API.
//!
//! Currently one layer: sliding-window rate limiting, applied outermost so
//! throttled requests never reach a handler.

pub mod rate_limit;

pub use rate_limit::{
    rate_limit_middleware, RateLimitQuota, RateLimitState, SlidingWindowLimiter,
};
