//! Local status probe
//!
//! Runs the diagnostic query once per request. Transient failures are
//! retried under the [`Retry`] policy; once the budget is spent the caller
//! gets [`PostgresConnectionError::connection_problems`].

use std::sync::Arc;

use tracing::warn;

use super::connection::Connector;
use super::errors::{PostgresConnectionError, PostgresResult};
use super::retry::Retry;
use super::status::StatusRow;

pub struct StatusProbe {
    connector: Arc<dyn Connector>,
    retry: Retry,
}

impl StatusProbe {
    pub fn new(connector: Arc<dyn Connector>, retry: Retry) -> Self {
        Self { connector, retry }
    }

    /// Run the diagnostic query. Blocking.
    ///
    /// Each attempt takes a connection from the connector and lets it go
    /// afterwards; pooling is the connector's business.
    pub fn query(&self) -> PostgresResult<StatusRow> {
        self.retry
            .call(|| self.connector.connect()?.query_status())
            .map_err(|err| {
                warn!(attempts = err.attempts, error = %err.last_error, "status query failed");
                PostgresConnectionError::connection_problems()
            })
    }
}
