//! Store error taxonomy and structured error records.
//!
//! # Responsibility
//! - Classify failures into local (never retried) and transient (retried).
//! - Carry the structured record produced once a retry budget is exhausted.
//!
//! # Invariants
//! - `InvalidInput`, `NotFound` and `Rejected` are never retried.
//! - `RetryExhausted` always carries the last underlying error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Error returned by domain store operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Caller-supplied shape is malformed.
    #[error("invalid input for `{field}`: {message}")]
    InvalidInput { field: &'static str, message: String },
    /// Target id is absent from the cache.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    /// Transient failure reported by the backing service.
    #[error("operation failed: {message}")]
    Operation { message: String },
    /// The backing service refused the call for a reason another attempt
    /// cannot change: a constraint violation or an unreadable row.
    #[error("rejected by backend: {message}")]
    Rejected { message: String },
    /// Every attempt of a retried operation failed.
    #[error("{} failed after {attempts} attempts: {last}", .record.action)]
    RetryExhausted {
        attempts: u32,
        record: Box<ErrorRecord>,
        last: Box<StoreError>,
    },
}

impl StoreError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Only transient backend failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Operation { .. })
    }

    /// Stable machine-readable code used in logs and error records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::NotFound { .. } => "not_found",
            Self::Operation { .. } => "operation_failed",
            Self::Rejected { .. } => "rejected",
            Self::RetryExhausted { .. } => "retry_exhausted",
        }
    }

    /// Returns the innermost non-retry error.
    pub fn root(&self) -> &StoreError {
        match self {
            Self::RetryExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

/// Structured record captured after a retry budget is spent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Code of the last underlying error.
    pub code: String,
    pub message: String,
    /// Store name, e.g. `tasks`.
    pub store: String,
    /// Operation name, e.g. `update`.
    pub action: String,
    /// Number of attempts made, 1-based.
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}
