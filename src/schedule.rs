//! Scheduled timestamps for switchovers and restarts
//!
//! A schedule must carry an explicit UTC offset and lie strictly in the
//! future. Accepted layouts are RFC 3339 and its space-separated variant,
//! with optional fractional seconds.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use thiserror::Error;

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Rejected schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Timezone information is mandatory for the scheduled {0}")]
    MissingTimezone(String),

    #[error("Cannot schedule {0} in the past")]
    InPast(String),

    #[error("Unable to parse scheduled timestamp. It should be in an unambiguous format, e.g. ISO 8601")]
    Unparseable,
}

impl ScheduleError {
    /// HTTP status for this rejection
    pub fn status_code(&self) -> u16 {
        match self {
            ScheduleError::MissingTimezone(_) => 400,
            ScheduleError::InPast(_) | ScheduleError::Unparseable => 422,
        }
    }
}

fn parse_with_offset(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed);
    }
    if raw.ends_with('Z') || raw.ends_with('z') {
        let trimmed = &raw[..raw.len() - 1];
        return NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
            .map(|naive| naive.and_utc().fixed_offset());
    }
    OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(raw, format).ok())
}

fn parses_without_offset(raw: &str) -> bool {
    NAIVE_FORMATS
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(raw, format).is_ok())
}

/// Parse `raw` for `action` ("switchover", "restart") relative to `now`.
pub fn parse_schedule(
    raw: &str,
    action: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<FixedOffset>, ScheduleError> {
    let raw = raw.trim();
    match parse_with_offset(raw) {
        Some(scheduled_at) if scheduled_at < now => Err(ScheduleError::InPast(action.to_string())),
        Some(scheduled_at) => Ok(scheduled_at),
        None if parses_without_offset(raw) => {
            Err(ScheduleError::MissingTimezone(action.to_string()))
        }
        None => Err(ScheduleError::Unparseable),
    }
}
