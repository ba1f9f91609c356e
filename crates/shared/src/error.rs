//! Caller-facing error types.

use thiserror::Error;

/// Errors surfaced to whatever sits above the ledger (a request handler, a job runner).
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before anything was written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Business rule violation, such as an unbalanced journal or a missing account.
    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    /// Conflict with the current state, such as reversing an entry twice.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage failed; the operation was rolled back and may be retried.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code an API layer should use for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::BusinessRule(_) => 422,
            Self::Conflict(_) => 409,
            Self::Database(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Returns the machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::BusinessRule(_) => "BUSINESS_RULE_VIOLATION",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if the caller may simply try the same operation again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}
