//! Connection seam for the local database
//!
//! The driver is plugged in through [`Connector`]. Besides the sqlx-backed
//! [`PgConnector`](super::PgConnector), [`FileConnector`] reads the row from
//! a JSON file on every query, which lets an external agent feed status into
//! a standalone API process, and [`StaticConnector`] serves a row held in
//! memory for tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::errors::{PostgresConnectionError, PostgresResult};
use super::status::StatusRow;

/// An open connection able to run the diagnostic query.
pub trait Connection: Send {
    fn query_status(&mut self) -> PostgresResult<StatusRow>;
}

/// Opens new connections to the local database.
pub trait Connector: Send + Sync {
    fn connect(&self) -> PostgresResult<Box<dyn Connection>>;
}

// ==================
// Static connector
// ==================

struct StaticConnection {
    row: Arc<Mutex<PostgresResult<StatusRow>>>,
}

impl Connection for StaticConnection {
    fn query_status(&mut self) -> PostgresResult<StatusRow> {
        match self.row.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Connector serving a row held in memory.
#[derive(Clone)]
pub struct StaticConnector {
    row: Arc<Mutex<PostgresResult<StatusRow>>>,
    refuse: Arc<Mutex<bool>>,
}

impl StaticConnector {
    pub fn new(row: StatusRow) -> Self {
        Self {
            row: Arc::new(Mutex::new(Ok(row))),
            refuse: Arc::new(Mutex::new(false)),
        }
    }

    /// Replace the row returned by subsequent queries.
    pub fn set_row(&self, row: PostgresResult<StatusRow>) {
        if let Ok(mut guard) = self.row.lock() {
            *guard = row;
        }
    }

    /// Refuse new connections.
    pub fn refuse_connections(&self, refuse: bool) {
        if let Ok(mut guard) = self.refuse.lock() {
            *guard = refuse;
        }
    }
}

impl Connector for StaticConnector {
    fn connect(&self) -> PostgresResult<Box<dyn Connection>> {
        let refused = self.refuse.lock().map(|guard| *guard).unwrap_or(true);
        if refused {
            return Err(PostgresConnectionError::connect("connection refused"));
        }
        Ok(Box::new(StaticConnection {
            row: Arc::clone(&self.row),
        }))
    }
}

// ==================
// File connector
// ==================

struct FileConnection {
    path: PathBuf,
}

impl Connection for FileConnection {
    fn query_status(&mut self) -> PostgresResult<StatusRow> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            PostgresConnectionError::query(format!("{}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            PostgresConnectionError::query(format!("{}: invalid status: {}", self.path.display(), e))
        })
    }
}

/// Connector reading the status row from a JSON file.
#[derive(Debug, Clone)]
pub struct FileConnector {
    path: PathBuf,
}

impl FileConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Connector for FileConnector {
    fn connect(&self) -> PostgresResult<Box<dyn Connection>> {
        if !self.path.exists() {
            return Err(PostgresConnectionError::connect(format!(
                "{} does not exist",
                self.path.display()
            )));
        }
        Ok(Box::new(FileConnection {
            path: self.path.clone(),
        }))
    }
}
