//! Local database error types
//!
//! Every failure to talk to the local PostgreSQL surfaces to API callers as
//! a single "connection problems" error; the kind is kept for logging.

use std::fmt;

/// Error raised when the local database cannot be queried.
#[derive(Debug, Clone)]
pub struct PostgresConnectionError {
    /// Error kind
    pub kind: PostgresErrorKind,
    /// Error message
    pub message: String,
}

/// Local database error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostgresErrorKind {
    /// A connection could not be established
    Connect,

    /// The diagnostic query failed on an established connection
    Query,

    /// Retries were exhausted before the deadline
    RetryFailed,
}

impl PostgresConnectionError {
    /// Create a new error.
    pub fn new(kind: PostgresErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a connect error.
    pub fn connect(reason: impl Into<String>) -> Self {
        Self::new(PostgresErrorKind::Connect, reason)
    }

    /// Create a query error.
    pub fn query(reason: impl Into<String>) -> Self {
        Self::new(PostgresErrorKind::Query, reason)
    }

    /// The error reported to API callers.
    pub fn connection_problems() -> Self {
        Self::new(PostgresErrorKind::RetryFailed, "connection problems")
    }
}

impl fmt::Display for PostgresConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PostgresConnectionError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for PostgresConnectionError {}

/// Result type for local database operations
pub type PostgresResult<T> = Result<T, PostgresConnectionError>;
