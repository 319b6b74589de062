//! Error Types for the Schoolyard API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use schoolyard_core::{CoreError, RateLimitError, StorageError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur during API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (400)
    /// Request validation failed
    ValidationFailed,

    /// Filter uses an operator the query language doesn't define
    UnknownOperator,

    // Not found errors (404)
    /// Requested document does not exist
    DocumentNotFound,

    // Conflict errors (409)
    /// Document with the same id already exists in the collection
    DocumentAlreadyExists,

    // Rate limiting (429)
    /// Request rate limit exceeded
    TooManyRequests,

    // Server errors (500, 503)
    /// Internal server error
    InternalError,

    /// Storage backend operation failed
    StorageError,

    /// Service is temporarily unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed | ErrorCode::UnknownOperator => StatusCode::BAD_REQUEST,

            ErrorCode::DocumentNotFound => StatusCode::NOT_FOUND,

            ErrorCode::DocumentAlreadyExists => StatusCode::CONFLICT,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InternalError | ErrorCode::StorageError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::UnknownOperator => "Unknown filter operator",
            ErrorCode::DocumentNotFound => "Document not found",
            ErrorCode::DocumentAlreadyExists => "Document already exists",
            ErrorCode::TooManyRequests => "Rate limit exceeded",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::StorageError => "Storage operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    /// Create a ValidationFailed error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    /// Create a DocumentNotFound error for a specific document.
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::new(
            ErrorCode::DocumentNotFound,
            format!("Document '{}' not found in '{}'", id, collection),
        )
    }

    /// Create an InternalError.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Allows ApiError to be returned directly from Axum handlers.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM CORE ERRORS
// ============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match &err {
            ValidationError::UnknownOperator { .. } => {
                ApiError::new(ErrorCode::UnknownOperator, err.to_string())
            }
            ValidationError::InvalidValue { .. } | ValidationError::EmptyBatch => {
                ApiError::validation(err.to_string())
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::Duplicate { .. } => {
                ApiError::new(ErrorCode::DocumentAlreadyExists, err.to_string())
            }
            // Log full backend errors; the response stays generic.
            StorageError::Backend { reason } => {
                tracing::error!("storage backend error: {}", reason);
                ApiError::from_code(ErrorCode::StorageError)
            }
            StorageError::Serialization { reason } => {
                tracing::error!("serialization error: {}", reason);
                ApiError::from_code(ErrorCode::StorageError)
            }
            StorageError::PoolExhausted { reason } => {
                tracing::error!("connection pool exhausted: {}", reason);
                ApiError::from_code(ErrorCode::ServiceUnavailable)
            }
        }
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        ApiError::new(ErrorCode::TooManyRequests, err.to_string())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Storage(e) => e.into(),
            CoreError::Validation(e) => e.into(),
            CoreError::RateLimit(e) => e.into(),
        }
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
