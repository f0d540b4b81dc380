//! DCS Error Types
//!
//! A DCS failure never aborts the process. Callers map these into an
//! "unavailable" or "unknown" outcome for the single request they serve.

use std::fmt;

/// DCS error type
#[derive(Debug, Clone)]
pub struct DcsError {
    /// Error kind
    pub kind: DcsErrorKind,
    /// Error message
    pub message: String,
}

/// DCS error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcsErrorKind {
    /// The store could not be reached
    Unavailable,

    /// The stored document could not be decoded
    Corrupted,

    /// Value rejected before it reached the store
    InvalidValue,
}

impl DcsError {
    /// Create a new DCS error.
    pub fn new(kind: DcsErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::new(DcsErrorKind::Unavailable, reason)
    }

    /// Create a corrupted document error.
    pub fn corrupted(reason: impl Into<String>) -> Self {
        Self::new(DcsErrorKind::Corrupted, reason)
    }

    /// Create an invalid value error.
    pub fn invalid_value(reason: impl Into<String>) -> Self {
        Self::new(DcsErrorKind::InvalidValue, reason)
    }
}

impl fmt::Display for DcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DcsError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for DcsError {}

/// Result type for DCS operations
pub type DcsResult<T> = Result<T, DcsError>;
