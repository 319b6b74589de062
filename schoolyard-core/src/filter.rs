//! Filter expressions for document queries.
//!
//! A query carries a list of `(field, op, value)` filters that are ANDed
//! together, an optional order field, and limit/offset pagination. Filters
//! reach one level into the payload: top-level fields only.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// In list of values
    In,
    /// Contains substring (for strings)
    Contains,
}

impl FilterOp {
    /// Parse an operator from its wire form.
    ///
    /// Accepts both the symbolic forms clients send (`"=="`, `"<="`, ...) and
    /// the word forms (`"eq"`, `"lte"`, ...). Unknown operators are rejected
    /// rather than silently dropped, so a typo can never widen a result set.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "==" | "eq" => Ok(Self::Eq),
            "!=" | "ne" => Ok(Self::Ne),
            "<" | "lt" => Ok(Self::Lt),
            "<=" | "lte" => Ok(Self::Lte),
            ">" | "gt" => Ok(Self::Gt),
            ">=" | "gte" => Ok(Self::Gte),
            "in" => Ok(Self::In),
            "contains" => Ok(Self::Contains),
            other => Err(ValidationError::UnknownOperator {
                operator: other.to_string(),
            }),
        }
    }

    /// The symbolic wire form of this operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::In => "in",
            Self::Contains => "contains",
        }
    }
}

/// One filter clause: compare a top-level field against a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Field to filter on
    pub field: String,
    /// Operator to apply
    pub op: FilterOp,
    /// Value to compare against (JSON value for flexibility)
    pub value: serde_json::Value,
}

impl Filter {
    /// Create a new filter clause.
    pub fn new(field: impl Into<String>, op: FilterOp, value: serde_json::Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    /// Create a contains filter.
    pub fn contains(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(field, FilterOp::Contains, value)
    }
}

/// Result ordering direction.
///
/// The reference behavior orders everything descending; ascending is exposed
/// as a deliberate enhancement rather than changed silently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending order
    Asc,
    /// Descending order (default, matches the reference behavior)
    #[default]
    Desc,
}

impl SortOrder {
    /// Parse an order direction from its wire form.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(ValidationError::InvalidValue {
                field: "order".to_string(),
                reason: format!("expected \"asc\" or \"desc\", got \"{}\"", other),
            }),
        }
    }
}

/// Full query specification: ANDed filters plus ordering and pagination.
///
/// When `order_by` is absent, results come back by creation time in the
/// requested direction. `limit`/`offset` is plain offset pagination, which
/// re-scans skipped rows; fine for small-to-moderate collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Filter clauses, ANDed together.
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Top-level field to order by; creation time when absent.
    pub order_by: Option<String>,
    /// Ordering direction.
    #[serde(default)]
    pub order: SortOrder,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Number of matching documents to skip.
    pub offset: Option<u64>,
}

impl QuerySpec {
    /// A spec with a single equality filter, the most common query shape.
    pub fn filtered(filters: Vec<Filter>) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    /// Set the result limit.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the pagination offset.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order by a named top-level field.
    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some(field.into());
        self.order = order;
        self
    }
}
