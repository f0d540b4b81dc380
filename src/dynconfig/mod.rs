//! Cluster-wide dynamic configuration
//!
//! The document stored in the DCS `/config` key, edited through
//! `PATCH /config` (merge) and `PUT /config` (replace).

mod errors;
mod merge;
mod service;

pub use errors::{ConfigMergeError, ConfigMergeResult};
pub use merge::patch_config;
pub use service::ConfigService;
