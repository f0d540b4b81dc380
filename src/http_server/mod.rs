//! # REST API
//!
//! The control-plane HTTP surface of a node: health and role checks for
//! load balancers, cluster introspection, and the operator actions
//! (switchover, restart, configuration edits).
//!
//! # Endpoints
//!
//! - `/`, `/primary`, `/replica`, ... - role checks
//! - `/patroni`, `/cluster`, `/history`, `/config`, `/metrics` - introspection
//! - `/switchover`, `/failover`, `/restart`, `/reinitialize` - operator actions

mod access;
mod cluster_routes;
mod config_routes;
mod control_routes;
mod errors;
mod health_routes;
mod restart_routes;
mod server;
mod state;
mod switchover_routes;

pub use access::{AccessDenied, AccessPolicy, ClientCertificate, Network, PolicyCell, AUTH_REALM};
pub use cluster_routes::cluster_document;
pub use errors::{parse_json_body, text_response, ApiError};
pub use server::{build_router, ApiServer};
pub use state::{ApiState, ProbeFailed};
