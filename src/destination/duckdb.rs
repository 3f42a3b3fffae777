//! Embedded DuckDB destination.
//!
//! DuckDB invalidates an open transaction as soon as one statement fails,
//! which would discard every earlier statement in the batch. Statements
//! therefore run in DuckDB's implicit per-statement transactions and
//! `commit` has nothing left to flush. DuckDB has no session switch for
//! foreign-key enforcement, so the constraint toggle is a no-op.

use super::{Destination, DestinationError};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// DuckDB database settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckDbConfig {
    /// Database file; in-memory when unset
    pub path: Option<PathBuf>,
}

impl DuckDbConfig {
    pub fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("duckdb://{}", path.display()),
            None => "duckdb://:memory:".to_string(),
        }
    }
}

pub struct DuckDbDestination {
    conn: Option<Connection>,
    target: String,
}

impl DuckDbDestination {
    pub fn connect(config: &DuckDbConfig) -> Result<Self, DestinationError> {
        let target = config.describe();
        info!(%target, "opening DuckDB database");

        let conn = match &config.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };

        Ok(Self {
            conn: Some(conn),
            target,
        })
    }

    /// Borrow the underlying connection, e.g. to inspect results after a run.
    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }
}

impl Destination for DuckDbDestination {
    fn describe(&self) -> String {
        self.target.clone()
    }

    fn execute(&mut self, sql: &str) -> Result<(), DestinationError> {
        let conn = self.conn.as_ref().ok_or(DestinationError::Closed)?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DestinationError> {
        if self.conn.is_none() {
            return Err(DestinationError::Closed);
        }
        Ok(())
    }

    fn set_constraint_checks(&mut self, enabled: bool) -> Result<(), DestinationError> {
        if self.conn.is_none() {
            return Err(DestinationError::Closed);
        }
        debug!(enabled, "DuckDB has no constraint toggle, skipping");
        Ok(())
    }

    fn close(&mut self) -> Result<(), DestinationError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| e)?;
        }
        Ok(())
    }
}
