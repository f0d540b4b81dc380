//! PostgreSQL connector on sqlx
//!
//! Connections come from a lazily connected [`PgPool`]. sqlx keeps and
//! recycles them; a connection handed out by [`PgConnector::connect`] goes
//! back to the pool when dropped. The [`Connector`] seam is blocking, so
//! every call is driven through the runtime handle captured at
//! construction and must be made from the blocking pool.

use std::str::FromStr;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tokio::runtime::Handle;

use super::connection::{Connection, Connector};
use super::errors::{PostgresConnectionError, PostgresResult};
use super::status::{ReplicationClient, StatusRow};

/// One row describing the local instance. Positions are byte offsets from
/// `0/0`; the timeline reads 0 on a standby.
pub const DIAGNOSTIC_QUERY: &str = "\
SELECT \
 pg_catalog.to_char(pg_catalog.pg_postmaster_start_time(), 'YYYY-MM-DD HH24:MI:SS.MS TZ') AS postmaster_start_time, \
 (CASE WHEN pg_catalog.pg_is_in_recovery() THEN 0 \
  ELSE ('x' || pg_catalog.substr(pg_catalog.pg_walfile_name(pg_catalog.pg_current_wal_lsn()), 1, 8))::bit(32)::int END)::bigint AS timeline, \
 (CASE WHEN pg_catalog.pg_is_in_recovery() THEN NULL \
  ELSE pg_catalog.pg_wal_lsn_diff(pg_catalog.pg_current_wal_lsn(), '0/0') END)::bigint AS wal_location, \
 pg_catalog.pg_wal_lsn_diff(pg_catalog.pg_last_wal_replay_lsn(), '0/0')::bigint AS replayed_location, \
 pg_catalog.to_char(pg_catalog.pg_last_xact_replay_timestamp(), 'YYYY-MM-DD HH24:MI:SS.MS TZ') AS replayed_timestamp, \
 (CASE WHEN pg_catalog.pg_is_in_recovery() THEN pg_catalog.pg_is_wal_replay_paused() ELSE false END) AS replay_paused, \
 pg_catalog.pg_wal_lsn_diff(pg_catalog.pg_last_wal_receive_lsn(), '0/0')::bigint AS received_location, \
 (SELECT pg_catalog.pg_wal_lsn_diff(w.latest_end_lsn, '0/0')::bigint FROM pg_catalog.pg_stat_get_wal_receiver() w) AS latest_end_lsn, \
 (SELECT w.status FROM pg_catalog.pg_stat_get_wal_receiver() w) AS receiver_state, \
 (SELECT pg_catalog.json_agg(r)::text FROM (\
  SELECT application_name, client_addr::text AS client_addr, state, sync_state, sync_priority \
  FROM pg_catalog.pg_stat_replication) r) AS replication";

/// Default size of the sqlx pool
pub const DEFAULT_POOL_SIZE: u32 = 2;

/// [`Connector`] backed by a sqlx [`PgPool`].
#[derive(Clone)]
pub struct PgConnector {
    pool: PgPool,
    runtime: Handle,
}

impl PgConnector {
    /// Build the pool for `url` without connecting. Must run inside a tokio
    /// runtime. The URL may carry credentials and is never logged.
    pub fn new(url: &str, max_connections: u32, acquire_timeout: Duration) -> PostgresResult<Self> {
        let options = PgConnectOptions::from_str(url)
            .map_err(|e| PostgresConnectionError::connect(format!("invalid connection url: {}", e)))?
            .application_name("pgha");
        let runtime = Handle::try_current().map_err(|e| PostgresConnectionError::connect(e.to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(acquire_timeout)
            .connect_lazy_with(options);
        Ok(Self { pool, runtime })
    }
}

impl Connector for PgConnector {
    fn connect(&self) -> PostgresResult<Box<dyn Connection>> {
        let conn = self
            .runtime
            .block_on(self.pool.acquire())
            .map_err(|e| PostgresConnectionError::connect(e.to_string()))?;
        Ok(Box::new(PgStatusConnection {
            conn,
            runtime: self.runtime.clone(),
        }))
    }
}

struct PgStatusConnection {
    conn: PoolConnection<Postgres>,
    runtime: Handle,
}

impl Connection for PgStatusConnection {
    fn query_status(&mut self) -> PostgresResult<StatusRow> {
        let row = self
            .runtime
            .block_on(sqlx::query(DIAGNOSTIC_QUERY).fetch_one(&mut *self.conn))
            .map_err(|e| PostgresConnectionError::query(e.to_string()))?;
        status_row(&row)
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> PostgresResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| PostgresConnectionError::query(format!("column {}: {}", name, e)))
}

fn position(row: &PgRow, name: &str) -> PostgresResult<Option<u64>> {
    let value: Option<i64> = column(row, name)?;
    Ok(value.and_then(|v| u64::try_from(v).ok()))
}

fn status_row(row: &PgRow) -> PostgresResult<StatusRow> {
    let timeline: Option<i64> = column(row, "timeline")?;
    let paused: Option<bool> = column(row, "replay_paused")?;
    let replication: Option<String> = column(row, "replication")?;
    Ok(StatusRow {
        postmaster_start_time: column(row, "postmaster_start_time")?,
        timeline: timeline.and_then(|t| u64::try_from(t).ok()).unwrap_or(0),
        wal_location: position(row, "wal_location")?,
        replayed_location: position(row, "replayed_location")?,
        replayed_timestamp: column(row, "replayed_timestamp")?,
        replay_paused: paused.unwrap_or(false),
        received_location: position(row, "received_location")?,
        latest_end_lsn: position(row, "latest_end_lsn")?,
        receiver_state: column(row, "receiver_state")?,
        replication: parse_replication(replication.as_deref())?,
    })
}

/// `pg_stat_replication` rows aggregated as JSON; `NULL` when there are none.
fn parse_replication(raw: Option<&str>) -> PostgresResult<Vec<ReplicationClient>> {
    match raw {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| PostgresConnectionError::query(format!("column replication: {}", e))),
    }
}
