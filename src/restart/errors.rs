//! # Restart Errors

use thiserror::Error;

use crate::schedule::ScheduleError;

/// Result type for restart validation
pub type RestartResult<T> = Result<T, RestartError>;

/// Reasons a restart request is refused before reaching the HA loop
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestartError {
    /// Body is not a JSON object
    #[error("{0}")]
    InvalidBody(String),

    #[error("Unknown filter for the scheduled restart: {0}")]
    UnknownFilter(String),

    #[error("PostgreSQL role should be either primary, standby_leader, or replica")]
    InvalidRole,

    #[error("{0}")]
    InvalidVersion(String),

    #[error("Timeout should be a positive number of seconds")]
    InvalidTimeout,

    #[error("Can't schedule restart in the paused state")]
    PausedSchedule,

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

impl RestartError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            RestartError::Schedule(err) => err.status_code(),
            _ => 400,
        }
    }
}
