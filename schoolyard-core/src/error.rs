//! Error types for Schoolyard operations.
//!
//! NotFound on update/delete is deliberately not an error: backends signal it
//! with a boolean return and the API layer decides how to surface it.

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend failure: {reason}")]
    Backend { reason: String },

    #[error("Duplicate document id {id} in collection {collection}")]
    Duplicate { collection: String, id: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Connection pool exhausted: {reason}")]
    PoolExhausted { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown filter operator: {operator}")]
    UnknownOperator { operator: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Batch request contains no items")]
    EmptyBatch,
}

/// Which sliding window a rate limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Minute,
    Hour,
}

impl std::fmt::Display for LimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitScope::Minute => write!(f, "minute"),
            LimitScope::Hour => write!(f, "hour"),
        }
    }
}

/// Rate limiting errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Rate limit exceeded: {limit} requests per {scope}")]
    Exceeded { limit: u32, scope: LimitScope },
}

/// Master error type for all Schoolyard errors.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),
}

/// Result type alias for Schoolyard operations.
pub type CoreResult<T> = Result<T, CoreError>;

impl StorageError {
    /// Wrap a lower-layer failure. Storage-unreachable and logic errors are
    /// not distinguished; everything propagates as a generic backend failure.
    pub fn backend(reason: impl std::fmt::Display) -> Self {
        StorageError::Backend {
            reason: reason.to_string(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_duplicate() {
        let err = StorageError::Duplicate {
            collection: "posts".to_string(),
            id: "p1".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Duplicate"));
        assert!(msg.contains("posts"));
        assert!(msg.contains("p1"));
    }

    #[test]
    fn test_validation_error_display_unknown_operator() {
        let err = ValidationError::UnknownOperator {
            operator: "like".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Unknown filter operator"));
        assert!(msg.contains("like"));
    }

    #[test]
    fn test_rate_limit_error_display_carries_scope() {
        let err = RateLimitError::Exceeded {
            limit: 60,
            scope: LimitScope::Minute,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("60"));
        assert!(msg.contains("minute"));

        let err = RateLimitError::Exceeded {
            limit: 1000,
            scope: LimitScope::Hour,
        };
        assert!(format!("{}", err).contains("hour"));
    }

    #[test]
    fn test_core_error_from_variants() {
        let storage = CoreError::from(StorageError::backend("connection refused"));
        assert!(matches!(storage, CoreError::Storage(_)));

        let validation = CoreError::from(ValidationError::UnknownOperator {
            operator: "~".to_string(),
        });
        assert!(matches!(validation, CoreError::Validation(_)));

        let rate = CoreError::from(RateLimitError::Exceeded {
            limit: 3,
            scope: LimitScope::Minute,
        });
        assert!(matches!(rate, CoreError::RateLimit(_)));
    }
}
