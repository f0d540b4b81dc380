//! DCS client seam
//!
//! Concrete backends (etcd, Consul, ZooKeeper, Kubernetes) live outside this
//! crate. The control API only needs a fresh read of the cluster and two
//! version-guarded writes.

use serde_json::Value;

use super::cluster::{Cluster, FailoverIntent};
use super::errors::DcsResult;

/// Precondition a write places on the key it replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// Write regardless of what is stored
    Any,
    /// The key must not exist
    Absent,
    /// The key must exist with exactly this version
    Version(u64),
}

impl Expected {
    /// Precondition matching what a read observed: the key's version, or
    /// its absence.
    pub fn observed(version: Option<u64>) -> Self {
        match version {
            Some(version) => Expected::Version(version),
            None => Expected::Absent,
        }
    }

    /// Whether a key currently at `current` satisfies the precondition.
    pub fn matches(&self, current: Option<u64>) -> bool {
        match self {
            Expected::Any => true,
            Expected::Absent => current.is_none(),
            Expected::Version(version) => current == Some(*version),
        }
    }
}

/// Operations the control API performs against the DCS.
///
/// `Ok(false)` from a write means the compare-and-set lost against a
/// concurrent writer; `Err` means the store itself failed.
pub trait Dcs: Send + Sync {
    /// Read the whole cluster state bypassing any cache.
    fn get_cluster(&self) -> DcsResult<Cluster>;

    /// Write (`Some`) or clear (`None`) the failover key.
    fn write_failover(&self, intent: Option<&FailoverIntent>, expected: Expected)
        -> DcsResult<bool>;

    /// Replace the dynamic configuration document.
    fn set_config_value(&self, config: &Value, expected: Expected) -> DcsResult<bool>;
}
