//! Health check routes and their query constraints

use std::collections::{BTreeMap, HashMap};

use super::lag::parse_lag;

/// A load balancer facing health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthRoute {
    Primary,
    Leader,
    StandbyLeader,
    Replica,
    ReadOnly,
    Synchronous,
    Quorum,
    Asynchronous,
    ReadOnlySync,
    ReadOnlyQuorum,
    Health,
    Liveness,
    Readiness,
}

/// Every path served by a health check, aliases included.
pub const HEALTH_PATHS: &[(&str, HealthRoute)] = &[
    ("/", HealthRoute::Primary),
    ("/primary", HealthRoute::Primary),
    ("/master", HealthRoute::Primary),
    ("/read-write", HealthRoute::Primary),
    ("/leader", HealthRoute::Leader),
    ("/standby-leader", HealthRoute::StandbyLeader),
    ("/standby_leader", HealthRoute::StandbyLeader),
    ("/replica", HealthRoute::Replica),
    ("/read-only", HealthRoute::ReadOnly),
    ("/synchronous", HealthRoute::Synchronous),
    ("/sync", HealthRoute::Synchronous),
    ("/quorum", HealthRoute::Quorum),
    ("/asynchronous", HealthRoute::Asynchronous),
    ("/async", HealthRoute::Asynchronous),
    ("/read-only-sync", HealthRoute::ReadOnlySync),
    ("/read-only-quorum", HealthRoute::ReadOnlyQuorum),
    ("/health", HealthRoute::Health),
    ("/liveness", HealthRoute::Liveness),
    ("/readiness", HealthRoute::Readiness),
];

impl HealthRoute {
    pub fn from_path(path: &str) -> Option<Self> {
        HEALTH_PATHS
            .iter()
            .find(|(candidate, _)| *candidate == path)
            .map(|(_, route)| *route)
    }

    /// Routes answered from the leader lock rather than replica health.
    pub fn is_leader_family(&self) -> bool {
        matches!(
            self,
            HealthRoute::Primary | HealthRoute::Leader | HealthRoute::StandbyLeader
        )
    }

    /// Routes answered with a status code and no body.
    pub fn is_probe(&self) -> bool {
        matches!(self, HealthRoute::Liveness | HealthRoute::Readiness)
    }
}

/// How readiness measures a standby's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadinessMode {
    /// Compare against the replayed position
    #[default]
    Apply,
    /// Compare against the received position
    Write,
}

/// Constraints parsed from the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteQuery {
    /// Maximum acceptable lag in bytes, `None` for unbounded
    pub lag: Option<u64>,
    pub mode: ReadinessMode,
    /// `tag_<key>=<value>` predicates keyed by `<key>`
    pub tags: BTreeMap<String, String>,
}

impl RouteQuery {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let lag = params.get("lag").and_then(|raw| parse_lag(raw));
        let mode = match params.get("mode").map(String::as_str) {
            Some("write") => ReadinessMode::Write,
            _ => ReadinessMode::Apply,
        };
        let tags = params
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix("tag_")
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect();
        Self { lag, mode, tags }
    }
}
