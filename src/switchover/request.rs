//! Switchover and failover requests

use std::fmt;

use serde_json::Value;

use super::errors::{SwitchoverError, SwitchoverResult};

/// Operator intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchoverAction {
    /// Planned move away from a healthy leader
    Switchover,
    /// Forced promotion of a specific candidate
    Failover,
}

impl SwitchoverAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchoverAction::Switchover => "switchover",
            SwitchoverAction::Failover => "failover",
        }
    }

    /// "Switchover" / "Failover"
    pub fn title(&self) -> &'static str {
        match self {
            SwitchoverAction::Switchover => "Switchover",
            SwitchoverAction::Failover => "Failover",
        }
    }

    /// Past tense used in result messages: "switched" / "failed".
    pub fn past_tense(&self) -> &'static str {
        match self {
            SwitchoverAction::Switchover => "switched",
            SwitchoverAction::Failover => "failed",
        }
    }

    pub fn past_tense_title(&self) -> &'static str {
        match self {
            SwitchoverAction::Switchover => "Switched",
            SwitchoverAction::Failover => "Failed",
        }
    }
}

impl fmt::Display for SwitchoverAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `POST /switchover` or `POST /failover` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchoverRequest {
    pub action: SwitchoverAction,
    pub leader: Option<String>,
    pub candidate: Option<String>,
    /// Unparsed `scheduled_at`, validated against the clock later
    pub scheduled_at: Option<String>,
}

fn text_field(body: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

impl SwitchoverRequest {
    /// Parse a request body. A failover naming a leader is a switchover;
    /// `member` is accepted in place of `candidate`.
    pub fn from_json(action: SwitchoverAction, body: &Value) -> SwitchoverResult<Self> {
        let body = body
            .as_object()
            .ok_or_else(|| SwitchoverError::validation("Request body must be a JSON object"))?;
        let leader = text_field(body, "leader");
        let candidate = text_field(body, "candidate").or_else(|| text_field(body, "member"));
        let action = if action == SwitchoverAction::Failover && leader.is_some() {
            SwitchoverAction::Switchover
        } else {
            action
        };
        Ok(Self {
            action,
            leader,
            candidate,
            scheduled_at: text_field(body, "scheduled_at"),
        })
    }
}
