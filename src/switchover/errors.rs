//! Switchover Error Types
//!
//! A rejected switchover is never retried automatically. Every rejection
//! carries the operator-facing message and the HTTP status it maps to.

use std::fmt;

use crate::schedule::ScheduleError;

/// Switchover error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchoverError {
    /// Error kind
    pub kind: SwitchoverErrorKind,
    /// Operator-facing message
    pub message: String,
}

/// Switchover error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchoverErrorKind {
    /// Request is malformed or contradicts itself
    Validation,

    /// Request is well formed but its schedule cannot be honoured
    Unprocessable,

    /// Cluster state does not allow the switchover
    Precondition,

    /// DCS rejected or could not take the write
    Unavailable,

    /// Nothing to act on
    NotFound,

    /// Lost a compare-and-set against a concurrent writer
    Conflict,
}

impl SwitchoverErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            SwitchoverErrorKind::Validation => 400,
            SwitchoverErrorKind::Unprocessable => 422,
            SwitchoverErrorKind::Precondition => 412,
            SwitchoverErrorKind::Unavailable => 503,
            SwitchoverErrorKind::NotFound => 404,
            SwitchoverErrorKind::Conflict => 409,
        }
    }
}

impl SwitchoverError {
    /// Create a new switchover error.
    pub fn new(kind: SwitchoverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(SwitchoverErrorKind::Validation, message)
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(SwitchoverErrorKind::Precondition, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(SwitchoverErrorKind::Unavailable, message)
    }

    /// Create a failed DCS write error.
    pub fn write_rejected() -> Self {
        Self::unavailable("failed to write failover key into DCS")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(SwitchoverErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(SwitchoverErrorKind::Conflict, message)
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

impl From<ScheduleError> for SwitchoverError {
    fn from(err: ScheduleError) -> Self {
        let kind = match err.status_code() {
            400 => SwitchoverErrorKind::Validation,
            _ => SwitchoverErrorKind::Unprocessable,
        };
        Self::new(kind, err.to_string())
    }
}

impl fmt::Display for SwitchoverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwitchoverError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for SwitchoverError {}

/// Result type for switchover operations
pub type SwitchoverResult<T> = Result<T, SwitchoverError>;
