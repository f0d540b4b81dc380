//! Local PostgreSQL access
//!
//! The control API reads the local instance through one diagnostic query.
//! Connections come from a [`Connector`]; [`PgConnector`] keeps them in a
//! sqlx pool. The query is wrapped in a bounded [`Retry`].

mod connection;
mod driver;
mod errors;
mod probe;
mod retry;
mod status;

pub use connection::{Connection, Connector, FileConnector, StaticConnector};
pub use driver::{PgConnector, DEFAULT_POOL_SIZE, DIAGNOSTIC_QUERY};
pub use errors::{PostgresConnectionError, PostgresErrorKind, PostgresResult};
pub use probe::StatusProbe;
pub use retry::{Retry, RetryFailedError};
pub use status::{ParamDiff, PostgresqlStatus, ReplicationClient, Role, State, StatusRow};
