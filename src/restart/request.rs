//! Restart request validation
//!
//! A restart request is a JSON object whose keys are filters. Unknown keys,
//! bad roles, malformed versions and non-positive timeouts are rejected
//! before anything is handed to the HA loop.

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::postgres::Role;
use crate::schedule::parse_schedule;

use super::errors::{RestartError, RestartResult};

/// Validated restart filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RestartRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "duration_secs")]
    pub timeout: Option<Duration>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub restart_pending: bool,
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_f64(d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }
}

impl RestartRequest {
    /// Validate a request body.
    ///
    /// `paused` rejects schedules, `now` anchors the "in the past" check.
    pub fn from_json(body: &Map<String, Value>, paused: bool, now: DateTime<Utc>) -> RestartResult<Self> {
        if paused && body.contains_key("schedule") {
            return Err(RestartError::PausedSchedule);
        }

        let mut request = RestartRequest::default();
        for (key, value) in body {
            match key.as_str() {
                "schedule" => {
                    let raw = value.as_str().ok_or(RestartError::Schedule(
                        crate::schedule::ScheduleError::Unparseable,
                    ))?;
                    request.schedule = Some(parse_schedule(raw, "restart", now)?);
                }
                "role" => {
                    let role = value
                        .as_str()
                        .and_then(|raw| raw.parse::<Role>().ok())
                        .filter(|role| *role != Role::Uninitialized)
                        .ok_or(RestartError::InvalidRole)?;
                    request.role = Some(role);
                }
                "postgres_version" => {
                    let raw = value
                        .as_str()
                        .ok_or_else(|| RestartError::InvalidVersion(format_message(&value.to_string())))?;
                    postgres_version_to_int(raw)?;
                    request.postgres_version = Some(raw.to_string());
                }
                "timeout" => {
                    let timeout = parse_timeout(value).ok_or(RestartError::InvalidTimeout)?;
                    request.timeout = Some(timeout);
                }
                "restart_pending" => {
                    request.restart_pending = match value {
                        Value::Bool(flag) => *flag,
                        Value::String(raw) => matches!(raw.to_ascii_lowercase().as_str(), "true" | "on" | "yes"),
                        _ => false,
                    };
                }
                other => return Err(RestartError::UnknownFilter(other.to_string())),
            }
        }
        Ok(request)
    }

    pub fn is_scheduled(&self) -> bool {
        self.schedule.is_some()
    }

    /// Whether the node satisfies the filters.
    pub fn matches(&self, role: Role, server_version: u32, pending_restart: bool) -> bool {
        if let Some(wanted) = self.role {
            if wanted != role {
                return false;
            }
        }
        if let Some(version) = &self.postgres_version {
            // Only restart nodes still running an older binary.
            match postgres_version_to_int(version) {
                Ok(wanted) if server_version < wanted => {}
                _ => return false,
            }
        }
        !self.restart_pending || pending_restart
    }
}

fn format_message(raw: &str) -> String {
    format!(
        "Invalid PostgreSQL version format: X.Y or X.Y.Z is accepted: {}",
        raw
    )
}

/// Convert `X.Y` (X >= 10) or `X.Y.Z` into the `server_version_num` form.
pub fn postgres_version_to_int(raw: &str) -> RestartResult<u32> {
    let well_formed = raw
        .split('.')
        .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    if !well_formed {
        return Err(RestartError::InvalidVersion(format_message(raw)));
    }

    let components: Vec<u32> = raw
        .split('.')
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| RestartError::InvalidVersion(format_message(raw)))?;

    match components.as_slice() {
        [major, minor] if *major >= 10 => Ok(major * 10000 + minor),
        [major, minor, patch] => Ok(major * 10000 + minor * 100 + patch),
        _ => Err(RestartError::InvalidVersion(format!(
            "Invalid PostgreSQL major version format: X.Y or X.Y.Z is accepted: {}",
            raw
        ))),
    }
}

/// Parse a timeout given as seconds or as a number with a time unit.
pub fn parse_timeout(value: &Value) -> Option<Duration> {
    static UNIT: OnceLock<Option<Regex>> = OnceLock::new();
    let seconds = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(raw) => {
            let unit = UNIT
                .get_or_init(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(us|ms|s|min|h|d)?\s*$").ok())
                .as_ref()?;
            let captures = unit.captures(raw)?;
            let amount: f64 = captures.get(1)?.as_str().parse().ok()?;
            let factor = match captures.get(2).map(|m| m.as_str()).unwrap_or("s") {
                "us" => 0.000_001,
                "ms" => 0.001,
                "s" => 1.0,
                "min" => 60.0,
                "h" => 3600.0,
                "d" => 86400.0,
                _ => return None,
            };
            amount * factor
        }
        _ => return None,
    };
    if seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).ok()
    } else {
        None
    }
}
