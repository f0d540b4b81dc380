//! Node configuration
//!
//! Loaded from a JSON file at startup and re-read on reload. Only the
//! `restapi` section takes effect without a restart.

mod errors;
mod restapi;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dcs::{Cluster, GlobalSettings, Tags};

pub use errors::{ConfigError, ConfigResult};
pub use restapi::{split_host_port, AuthConfig, RestApiConfig, ServerTokens, VerifyClient};

/// The `dcs` section: local defaults for the cluster-wide timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcsSettings {
    /// Leader lock TTL in seconds (default: 30)
    #[serde(default = "default_ttl")]
    pub ttl: u64,

    /// Seconds between HA loop iterations (default: 10)
    #[serde(default = "default_loop_wait")]
    pub loop_wait: u64,

    /// Seconds allowed for DCS and PostgreSQL retries (default: 10)
    #[serde(default = "default_retry_timeout")]
    pub retry_timeout: u64,

    /// Initial cluster state for the in-process store
    #[serde(default)]
    pub seed: Option<Cluster>,
}

fn default_ttl() -> u64 {
    30
}
fn default_loop_wait() -> u64 {
    10
}
fn default_retry_timeout() -> u64 {
    10
}

impl Default for DcsSettings {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            loop_wait: default_loop_wait(),
            retry_timeout: default_retry_timeout(),
            seed: None,
        }
    }
}

/// The `postgresql` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresqlSettings {
    /// libpq-style URL of the local instance
    #[serde(default = "default_connect_url")]
    pub connect_url: String,

    /// Connections kept by the status query pool (default: 2)
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Seconds to wait for a pooled connection (default: 5)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// JSON file holding the latest diagnostic row. Replaces the database
    /// connection when an external agent feeds the status.
    #[serde(default)]
    pub status_file: Option<PathBuf>,

    /// `server_version_num` reported in status documents
    #[serde(default)]
    pub server_version: u32,
}

fn default_connect_url() -> String {
    "postgres://postgres@localhost:5432/postgres".to_string()
}
fn default_pool_size() -> u32 {
    crate::postgres::DEFAULT_POOL_SIZE
}
fn default_connect_timeout() -> u64 {
    5
}

impl Default for PostgresqlSettings {
    fn default() -> Self {
        Self {
            connect_url: default_connect_url(),
            pool_size: default_pool_size(),
            connect_timeout: default_connect_timeout(),
            status_file: None,
            server_version: 0,
        }
    }
}

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PgHaConfig {
    /// Member name, unique within the scope
    pub name: String,

    /// Cluster name (default: "postgres")
    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default)]
    pub restapi: RestApiConfig,

    #[serde(default)]
    pub dcs: DcsSettings,

    #[serde(default)]
    pub postgresql: PostgresqlSettings,

    #[serde(default)]
    pub tags: Tags,
}

fn default_scope() -> String {
    "postgres".to_string()
}

impl PgHaConfig {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: PgHaConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        if self.scope.trim().is_empty() {
            return Err(ConfigError::invalid("scope", "must not be empty"));
        }
        if self.dcs.ttl < 20 {
            return Err(ConfigError::invalid("dcs.ttl", "must be at least 20"));
        }
        if self.dcs.loop_wait < 1 {
            return Err(ConfigError::invalid("dcs.loop_wait", "must be at least 1"));
        }
        if self.dcs.retry_timeout < 3 {
            return Err(ConfigError::invalid("dcs.retry_timeout", "must be at least 3"));
        }
        if self.postgresql.pool_size < 1 {
            return Err(ConfigError::invalid("postgresql.pool_size", "must be at least 1"));
        }
        if self.postgresql.connect_timeout < 1 {
            return Err(ConfigError::invalid("postgresql.connect_timeout", "must be at least 1"));
        }
        self.restapi.validate()
    }

    /// Cluster-wide settings to assume until the DCS says otherwise.
    pub fn initial_settings(&self) -> GlobalSettings {
        GlobalSettings {
            loop_wait: self.dcs.loop_wait,
            ttl: self.dcs.ttl,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_minimal_config() {
        let config = PgHaConfig::from_json(r#"{"name": "node1"}"#).unwrap();
        assert_eq!(config.scope, "postgres");
        assert_eq!(config.dcs.ttl, 30);
        assert_eq!(config.restapi.listen, "127.0.0.1:8008");
        assert_eq!(config.initial_settings().loop_wait, 10);
        assert_eq!(
            config.postgresql.connect_url,
            "postgres://postgres@localhost:5432/postgres"
        );
        assert_eq!(config.postgresql.pool_size, 2);
    }

    #[test]
    fn test_postgresql_bounds() {
        let err = PgHaConfig::from_json(r#"{"name": "n", "postgresql": {"pool_size": 0}}"#)
            .unwrap_err();
        assert_eq!(err.field(), Some("postgresql.pool_size"));
        let err = PgHaConfig::from_json(r#"{"name": "n", "postgresql": {"connect_timeout": 0}}"#)
            .unwrap_err();
        assert_eq!(err.field(), Some("postgresql.connect_timeout"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "name": "node2",
                "scope": "demo",
                "restapi": {{"listen": "0.0.0.0:8009", "allowlist": ["10.0.0.0/8"]}},
                "dcs": {{"ttl": 40, "loop_wait": 5}},
                "tags": {{"nofailover": false, "zone": "a"}}
            }}"#
        )
        .unwrap();

        let config = PgHaConfig::load(file.path()).unwrap();
        assert_eq!(config.name, "node2");
        assert_eq!(config.restapi.allowlist, vec!["10.0.0.0/8".to_string()]);
        assert_eq!(config.dcs.loop_wait, 5);
        assert_eq!(config.tags.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let err = PgHaConfig::load(Path::new("/nonexistent/pgha.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_timing_bounds() {
        let err = PgHaConfig::from_json(r#"{"name": "n", "dcs": {"ttl": 10}}"#).unwrap_err();
        assert_eq!(err.field(), Some("dcs.ttl"));
        let err = PgHaConfig::from_json(r#"{"name": "n", "dcs": {"loop_wait": 0}}"#).unwrap_err();
        assert_eq!(err.field(), Some("dcs.loop_wait"));
        let err =
            PgHaConfig::from_json(r#"{"name": "n", "dcs": {"retry_timeout": 2}}"#).unwrap_err();
        assert_eq!(err.field(), Some("dcs.retry_timeout"));
    }

    #[test]
    fn test_invalid_json_and_empty_name() {
        assert!(matches!(
            PgHaConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(
            PgHaConfig::from_json(r#"{"name": " "}"#).unwrap_err().field(),
            Some("name")
        );
    }

    #[test]
    fn test_restapi_errors_surface() {
        let err = PgHaConfig::from_json(r#"{"name": "n", "restapi": {"listen": "foo"}}"#)
            .unwrap_err();
        assert_eq!(err.field(), Some("restapi.listen"));
    }
}
