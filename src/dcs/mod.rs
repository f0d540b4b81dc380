//! Cluster state held in the distributed configuration store (DCS)
//!
//! - `cluster`: the immutable [`Cluster`] snapshot and its parts
//! - `snapshot`: lock-light publication of the latest snapshot
//! - `store`: the [`Dcs`] trait implemented by backends
//! - `memory`: an in-process backend

mod cluster;
mod errors;
mod memory;
mod snapshot;
mod store;
mod tags;

pub use cluster::{
    url_authority, Cluster, ClusterConfig, ClusterStatus, FailoverIntent, HistoryEntry, Member,
    SyncRole, SyncState,
};
pub use errors::{DcsError, DcsErrorKind, DcsResult};
pub use memory::MemoryDcs;
pub use snapshot::{GlobalSettings, SnapshotHandle};
pub use store::{Dcs, Expected};
pub use tags::{tag_flag, tags_match, TagValue, Tags};
