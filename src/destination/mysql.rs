//! MySQL destination.
//!
//! Wraps a single `mysql_async` connection behind a blocking interface: the
//! destination owns a current-thread tokio runtime and drives every round
//! trip to completion before returning.

use super::{Destination, DestinationError};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder};
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// MySQL connection settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MySqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Database to select; `None` when the dump carries its own `USE`
    pub database: Option<String>,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: None,
        }
    }
}

impl std::fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

impl MySqlConfig {
    pub fn describe(&self) -> String {
        match &self.database {
            Some(db) => format!("mysql://{}@{}:{}/{}", self.user, self.host, self.port, db),
            None => format!("mysql://{}@{}:{}", self.user, self.host, self.port),
        }
    }

    fn opts(&self) -> OptsBuilder {
        OptsBuilder::default()
            .ip_or_hostname(self.host.clone())
            .tcp_port(self.port)
            .user(Some(self.user.clone()))
            .pass(Some(self.password.clone()))
            .db_name(self.database.clone())
    }
}

pub struct MySqlDestination {
    runtime: Runtime,
    conn: Option<Conn>,
    target: String,
}

impl MySqlDestination {
    /// Connect with autocommit disabled and a utf8mb4 session charset.
    pub fn connect(config: &MySqlConfig) -> Result<Self, DestinationError> {
        let target = config.describe();
        info!(%target, "connecting to MySQL");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let mut conn = runtime.block_on(Conn::new(config.opts()))?;
        runtime.block_on(conn.query_drop("SET NAMES utf8mb4"))?;
        runtime.block_on(conn.query_drop("SET autocommit=0"))?;

        Ok(Self {
            runtime,
            conn: Some(conn),
            target,
        })
    }

    fn query(&mut self, sql: &str) -> Result<(), DestinationError> {
        let conn = self.conn.as_mut().ok_or(DestinationError::Closed)?;
        self.runtime.block_on(conn.query_drop(sql))?;
        Ok(())
    }
}

impl Destination for MySqlDestination {
    fn describe(&self) -> String {
        self.target.clone()
    }

    fn execute(&mut self, sql: &str) -> Result<(), DestinationError> {
        self.query(sql)
    }

    fn commit(&mut self) -> Result<(), DestinationError> {
        self.query("COMMIT")
    }

    fn set_constraint_checks(&mut self, enabled: bool) -> Result<(), DestinationError> {
        debug!(enabled, "setting FOREIGN_KEY_CHECKS");
        if enabled {
            self.query("SET FOREIGN_KEY_CHECKS=1")
        } else {
            self.query("SET FOREIGN_KEY_CHECKS=0")
        }
    }

    fn close(&mut self) -> Result<(), DestinationError> {
        if let Some(conn) = self.conn.take() {
            self.runtime.block_on(conn.disconnect())?;
        }
        Ok(())
    }
}

impl Drop for MySqlDestination {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = self.runtime.block_on(conn.disconnect());
        }
    }
}
