//! # Dynamic Configuration Errors

use thiserror::Error;

/// Result type for dynamic configuration writes
pub type ConfigMergeResult<T> = Result<T, ConfigMergeError>;

/// Dynamic configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigMergeError {
    #[error("{0}")]
    InvalidBody(String),

    #[error("configuration is not available in DCS")]
    NoConfig,

    #[error("configuration was modified concurrently")]
    Conflict,

    #[error("DCS is not accessible: {0}")]
    Unavailable(String),

    #[error("failed to write configuration into DCS")]
    WriteFailed,
}

impl ConfigMergeError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ConfigMergeError::InvalidBody(_) => 400,
            ConfigMergeError::NoConfig
            | ConfigMergeError::Conflict
            | ConfigMergeError::Unavailable(_) => 503,
            ConfigMergeError::WriteFailed => 502,
        }
    }
}
