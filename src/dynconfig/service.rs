//! Dynamic configuration writes
//!
//! `PATCH` merges into the stored document and writes it back with a
//! compare-and-set on the observed version. `PUT` replaces the document
//! unconditionally. Both skip the write when nothing changed.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::dcs::{Dcs, Expected};
use crate::ha::HaHandle;

use super::errors::{ConfigMergeError, ConfigMergeResult};
use super::merge::patch_config;

fn as_object(body: &Value) -> ConfigMergeResult<&Map<String, Value>> {
    body.as_object()
        .ok_or_else(|| ConfigMergeError::InvalidBody("Configuration must be a JSON object".into()))
}

pub struct ConfigService {
    dcs: Arc<dyn Dcs>,
    ha: Arc<dyn HaHandle>,
}

impl ConfigService {
    pub fn new(dcs: Arc<dyn Dcs>, ha: Arc<dyn HaHandle>) -> Self {
        Self { dcs, ha }
    }

    /// Merge `body` into the stored configuration. Returns the merged
    /// document.
    pub fn patch(&self, body: &Value) -> ConfigMergeResult<Value> {
        let patch = as_object(body)?;
        let cluster = self
            .dcs
            .get_cluster()
            .map_err(|err| ConfigMergeError::Unavailable(err.message))?;
        let config = cluster.config.ok_or(ConfigMergeError::NoConfig)?;
        if config.version == 0 {
            return Err(ConfigMergeError::NoConfig);
        }

        let mut data = config.data;
        if patch_config(&mut data, patch) {
            let merged = Value::Object(data);
            match self.dcs.set_config_value(&merged, Expected::Version(config.version)) {
                Ok(true) => info!(version = config.version, "dynamic configuration patched"),
                Ok(false) => {
                    warn!(version = config.version, "dynamic configuration changed concurrently");
                    return Err(ConfigMergeError::Conflict);
                }
                Err(err) => return Err(ConfigMergeError::Unavailable(err.message)),
            }
            self.ha.wakeup();
            return Ok(merged);
        }
        self.ha.wakeup();
        Ok(Value::Object(data))
    }

    /// Replace the stored configuration with `body`. Returns `body`.
    pub fn replace(&self, body: &Value) -> ConfigMergeResult<Value> {
        as_object(body)?;
        let unchanged = match self.dcs.get_cluster() {
            Ok(cluster) => cluster
                .config
                .map(|config| Value::Object(config.data) == *body)
                .unwrap_or(false),
            Err(err) => {
                warn!(error = %err, "cannot read configuration before replacing it");
                false
            }
        };
        if !unchanged {
            match self.dcs.set_config_value(body, Expected::Any) {
                Ok(true) => info!("dynamic configuration replaced"),
                Ok(false) => return Err(ConfigMergeError::WriteFailed),
                Err(err) => {
                    warn!(error = %err, "dynamic configuration write failed");
                    return Err(ConfigMergeError::WriteFailed);
                }
            }
        }
        self.ha.wakeup();
        Ok(body.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcs::{Cluster, ClusterConfig, MemoryDcs, SnapshotHandle};
    use crate::ha::StandaloneHa;
    use crate::shutdown::ShutdownSignal;
    use serde_json::json;

    fn service(cluster: Cluster) -> (Arc<MemoryDcs>, ConfigService) {
        let dcs = Arc::new(MemoryDcs::new(cluster));
        let ha = Arc::new(StandaloneHa::new(
            "node1",
            Arc::new(SnapshotHandle::new()),
            Arc::new(ShutdownSignal::new()),
        ));
        let service = ConfigService::new(dcs.clone(), ha);
        (dcs, service)
    }

    fn configured() -> Cluster {
        Cluster {
            config: Some(ClusterConfig::new(3, json!({"ttl": 30, "postgresql": {"parameters": {"a": 1}}}))),
            ..Default::default()
        }
    }

    #[test]
    fn test_patch_writes_merged_document() {
        let (dcs, service) = service(configured());
        let merged = service
            .patch(&json!({"ttl": 40, "postgresql": {"parameters": {"b": 2}}}))
            .unwrap();
        assert_eq!(
            merged,
            json!({"ttl": 40, "postgresql": {"parameters": {"a": 1, "b": 2}}})
        );
        assert_eq!(Value::Object(dcs.cluster().config.unwrap().data), merged);
    }

    #[test]
    fn test_patch_without_config() {
        let (_, service) = service(Cluster::default());
        assert_eq!(service.patch(&json!({"ttl": 40})), Err(ConfigMergeError::NoConfig));
    }

    #[test]
    fn test_patch_conflict_is_unavailable() {
        let (dcs, service) = service(configured());
        dcs.reject_writes(true);
        let err = service.patch(&json!({"ttl": 40})).unwrap_err();
        assert_eq!(err, ConfigMergeError::Conflict);
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_patch_loses_against_newer_version() {
        let (dcs, service) = service(configured());
        // The read sees version 3 while another node already wrote version 8.
        dcs.push_read(configured());
        dcs.replace(Cluster {
            config: Some(ClusterConfig::new(8, json!({"ttl": 90}))),
            ..Default::default()
        });
        assert_eq!(
            service.patch(&json!({"ttl": 40})).unwrap_err(),
            ConfigMergeError::Conflict
        );
        let stored = dcs.cluster().config.unwrap();
        assert_eq!(stored.version, 8);
        assert_eq!(stored.data["ttl"], json!(90));
    }

    #[test]
    fn test_patch_rejects_non_object() {
        let (_, service) = service(configured());
        assert_eq!(service.patch(&json!("x")).unwrap_err().status_code(), 400);
    }

    #[test]
    fn test_replace() {
        let (dcs, service) = service(configured());
        let body = json!({"ttl": 60});
        assert_eq!(service.replace(&body).unwrap(), body);
        assert_eq!(Value::Object(dcs.cluster().config.unwrap().data), body);

        dcs.fail_writes(true);
        // Same document: no write attempted.
        assert!(service.replace(&body).is_ok());
        let err = service.replace(&json!({"ttl": 70})).unwrap_err();
        assert_eq!(err.status_code(), 502);
    }
}
