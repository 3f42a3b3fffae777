//! Replay destinations.
//!
//! A [`Destination`] is a single exclusively-owned connection with manual
//! transaction control. The replay driver only ever needs four things from
//! it: run a statement, commit, toggle constraint checks and close.

mod duckdb;
mod mysql;

pub use self::duckdb::{DuckDbConfig, DuckDbDestination};
pub use self::mysql::{MySqlConfig, MySqlDestination};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a destination.
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error(transparent)]
    MySql(#[from] mysql_async::Error),

    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error("failed to start MySQL client runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("connection already closed")]
    Closed,

    #[error("{0}")]
    Message(String),
}

/// A relational database a dump is replayed into.
pub trait Destination {
    /// Label used in console output, e.g. `mysql://root@localhost:3306/shop`
    fn describe(&self) -> String;

    /// Execute one statement inside the current transaction.
    fn execute(&mut self, sql: &str) -> Result<(), DestinationError>;

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<(), DestinationError>;

    /// Enable or disable foreign-key enforcement for this session.
    fn set_constraint_checks(&mut self, enabled: bool) -> Result<(), DestinationError>;

    /// Release the connection. Further calls fail with [`DestinationError::Closed`].
    fn close(&mut self) -> Result<(), DestinationError> {
        Ok(())
    }
}

impl<D: Destination + ?Sized> Destination for Box<D> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn execute(&mut self, sql: &str) -> Result<(), DestinationError> {
        (**self).execute(sql)
    }

    fn commit(&mut self) -> Result<(), DestinationError> {
        (**self).commit()
    }

    fn set_constraint_checks(&mut self, enabled: bool) -> Result<(), DestinationError> {
        (**self).set_constraint_checks(enabled)
    }

    fn close(&mut self) -> Result<(), DestinationError> {
        (**self).close()
    }
}

/// Connection descriptor for a destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DestinationConfig {
    Mysql(MySqlConfig),
    Duckdb(DuckDbConfig),
}

impl Default for DestinationConfig {
    fn default() -> Self {
        DestinationConfig::Mysql(MySqlConfig::default())
    }
}

impl DestinationConfig {
    /// Open a connection. Fails if the destination is unreachable or
    /// rejects the credentials.
    pub fn connect(&self) -> Result<Box<dyn Destination>, DestinationError> {
        Ok(match self {
            DestinationConfig::Mysql(config) => Box::new(MySqlDestination::connect(config)?),
            DestinationConfig::Duckdb(config) => Box::new(DuckDbDestination::connect(config)?),
        })
    }

    pub fn describe(&self) -> String {
        match self {
            DestinationConfig::Mysql(config) => config.describe(),
            DestinationConfig::Duckdb(config) => config.describe(),
        }
    }
}
