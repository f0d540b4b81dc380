//! Health and role classification
//!
//! Load balancers ask "should I route to this node for X?". Each route maps
//! to a [`HealthRoute`]; the answer combines the local PostgreSQL status,
//! the cluster snapshot and query constraints (`lag=`, `tag_*=`, `mode=`).

mod classifier;
mod lag;
mod route;
mod status;

pub use classifier::{liveness, NodeView, OK, UNAVAILABLE};
pub use lag::parse_lag;
pub use route::{HealthRoute, ReadinessMode, RouteQuery, HEALTH_PATHS};
pub use status::{status_document, unknown_document, NodeIdentity, StatusContext};
