//! YAML run configuration for the replay command.
//!
//! Every field is optional; command-line flags take precedence over values
//! from the file.

use crate::destination::{DestinationConfig, DuckDbConfig, MySqlConfig};
use crate::replay::{ReplayOptions, ReplayRequest, DEFAULT_COMMIT_EVERY};
use crate::source::Origin;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("no dump source given (pass SOURCE or set `source` in the config file)")]
    MissingSource,

    #[error("commit_every must be at least 1")]
    InvalidCommitEvery,

    #[error(
        "a DuckDB destination cannot be combined with MySQL connection settings \
         (--host/--port/--user/--password/--database or SQL_REPLAY_* env vars)"
    )]
    ConflictingDestination,
}

/// Complete YAML configuration for a replay run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayYamlConfig {
    /// URL, file path or literal SQL
    pub source: Option<String>,
    pub destination: Option<DestinationConfig>,
    pub commit_every: Option<usize>,
    pub stop_on_error: Option<bool>,
}

impl ReplayYamlConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml_ng::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Settings given on the command line
#[derive(Debug, Clone, Default)]
pub struct ReplayOverrides {
    pub source: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub duckdb: Option<PathBuf>,
    pub commit_every: Option<usize>,
    pub stop_on_error: bool,
}

impl ReplayOverrides {
    fn has_mysql_flags(&self) -> bool {
        self.host.is_some()
            || self.port.is_some()
            || self.user.is_some()
            || self.password.is_some()
            || self.database.is_some()
    }

    /// Merge with an optional config file into a ready-to-run request.
    pub fn resolve(self, file: Option<ReplayYamlConfig>) -> Result<ReplayRequest, ConfigError> {
        let file = file.unwrap_or_default();

        let source = self
            .source
            .clone()
            .or(file.source)
            .ok_or(ConfigError::MissingSource)?;

        let commit_every = self
            .commit_every
            .or(file.commit_every)
            .unwrap_or(DEFAULT_COMMIT_EVERY);
        if commit_every == 0 {
            return Err(ConfigError::InvalidCommitEvery);
        }

        let stop_on_error = self.stop_on_error || file.stop_on_error.unwrap_or(false);

        let destination = match (self.duckdb.clone(), file.destination) {
            (Some(_), _) | (None, Some(DestinationConfig::Duckdb(_)))
                if self.has_mysql_flags() =>
            {
                return Err(ConfigError::ConflictingDestination);
            }
            (Some(path), _) => {
                let path = (path.as_os_str() != ":memory:").then_some(path);
                DestinationConfig::Duckdb(DuckDbConfig { path })
            }
            (None, Some(DestinationConfig::Duckdb(duck))) => DestinationConfig::Duckdb(duck),
            (None, Some(DestinationConfig::Mysql(mysql))) => {
                DestinationConfig::Mysql(self.apply_mysql(mysql))
            }
            (None, None) => DestinationConfig::Mysql(self.apply_mysql(MySqlConfig::default())),
        };

        Ok(ReplayRequest {
            origin: Origin::resolve(&source),
            destination,
            options: ReplayOptions {
                commit_every,
                stop_on_error,
            },
        })
    }

    fn apply_mysql(&self, mut mysql: MySqlConfig) -> MySqlConfig {
        if let Some(host) = &self.host {
            mysql.host = host.clone();
        }
        if let Some(port) = self.port {
            mysql.port = port;
        }
        if let Some(user) = &self.user {
            mysql.user = user.clone();
        }
        if let Some(password) = &self.password {
            mysql.password = password.clone();
        }
        if let Some(database) = &self.database {
            mysql.database = Some(database.clone());
        }
        mysql
    }
}
