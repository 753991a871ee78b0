// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for pipeline-env.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How the database state is persisted between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupFormat {
    /// `pg_dump` output restored through `psql`.
    SqlDump,
    /// Embedded DuckDB file copied in and out of a named volume.
    DuckDbFile,
}

impl FromStr for BackupFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sql" | "postgres" | "pg_dump" => Ok(Self::SqlDump),
            "duckdb" => Ok(Self::DuckDbFile),
            other => Err(ConfigError::InvalidBackupFormat(other.to_string())),
        }
    }
}

/// Controller configuration.
///
/// Everything the controller needs is carried here so that nothing below the
/// binary reads the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Extra compose file passed as `-f` (compose default lookup otherwise)
    pub compose_file: Option<PathBuf>,
    /// Compose project name passed as `-p`
    pub compose_project: Option<String>,
    /// Compose service running the database
    pub db_service: String,
    /// Host the maintenance script connects to
    pub db_host: String,
    /// Locally exposed database port
    pub db_port: u16,
    /// Logical database restored and dumped
    pub db_name: String,
    /// Role used for probe, dump and restore
    pub db_user: String,
    /// Password exported as `PGPASSWORD` inside the container
    pub db_password: Option<String>,
    /// Database to connect to while dropping and recreating `db_name`
    pub maintenance_db: String,
    /// Backup format
    pub backup_format: BackupFormat,
    /// SQL dump location
    pub backup_path: PathBuf,
    /// Named volume holding the DuckDB file
    pub duckdb_volume: String,
    /// Host copy of the DuckDB file
    pub duckdb_file: PathBuf,
    /// Delay between readiness probes
    pub ready_interval: Duration,
    /// Upper bound on the readiness wait, zero means unbounded
    pub ready_timeout: Duration,
    /// One-shot initialization service
    pub init_service: String,
    /// Compose profile that enables `init_service`
    pub init_profile: String,
    /// Maintenance script forwarded to by `db`
    pub reset_script: PathBuf,
    /// Interpreter for `reset_script`
    pub python: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compose_file: None,
            compose_project: None,
            db_service: "pipeline-db".to_string(),
            db_host: "localhost".to_string(),
            db_port: 5433,
            db_name: "pipeline".to_string(),
            db_user: "airflow".to_string(),
            db_password: None,
            maintenance_db: "postgres".to_string(),
            backup_format: BackupFormat::SqlDump,
            backup_path: PathBuf::from("./data/pipeline_backup.sql"),
            duckdb_volume: "pipeline-data".to_string(),
            duckdb_file: PathBuf::from("./data/pipeline.duckdb"),
            ready_interval: Duration::from_secs(2),
            ready_timeout: Duration::from_secs(300),
            init_service: "airflow-init".to_string(),
            init_profile: "init".to_string(),
            reset_script: PathBuf::from("scripts/reset_db.py"),
            python: "python3".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_port = match var("PIPELINE_DB_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or(ConfigError::InvalidPort(raw))?,
            None => defaults.db_port,
        };

        // A zero interval would spawn probes back to back.
        let ready_interval = parse_secs(
            "PIPELINE_READY_INTERVAL_SECS",
            var("PIPELINE_READY_INTERVAL_SECS"),
            defaults.ready_interval,
        )?;
        if ready_interval.is_zero() {
            return Err(ConfigError::InvalidNumber {
                key: "PIPELINE_READY_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        let backup_format = match var("PIPELINE_BACKUP_FORMAT") {
            Some(raw) => raw.parse()?,
            None => defaults.backup_format,
        };

        Ok(Self {
            compose_file: var("PIPELINE_COMPOSE_FILE").map(PathBuf::from),
            compose_project: var("PIPELINE_COMPOSE_PROJECT"),
            db_service: var("PIPELINE_DB_SERVICE").unwrap_or(defaults.db_service),
            db_host: var("PIPELINE_DB_HOST").unwrap_or(defaults.db_host),
            db_port,
            db_name: var("PIPELINE_DB_NAME").unwrap_or(defaults.db_name),
            db_user: var("PIPELINE_DB_USER").unwrap_or(defaults.db_user),
            db_password: var("PIPELINE_DB_PASSWORD"),
            maintenance_db: var("PIPELINE_DB_MAINTENANCE").unwrap_or(defaults.maintenance_db),
            backup_format,
            backup_path: var("PIPELINE_BACKUP_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.backup_path),
            duckdb_volume: var("PIPELINE_DUCKDB_VOLUME").unwrap_or(defaults.duckdb_volume),
            duckdb_file: var("PIPELINE_DUCKDB_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.duckdb_file),
            ready_interval,
            ready_timeout: parse_secs(
                "PIPELINE_READY_TIMEOUT_SECS",
                var("PIPELINE_READY_TIMEOUT_SECS"),
                defaults.ready_timeout,
            )?,
            init_service: var("PIPELINE_INIT_SERVICE").unwrap_or(defaults.init_service),
            init_profile: var("PIPELINE_INIT_PROFILE").unwrap_or(defaults.init_profile),
            reset_script: var("PIPELINE_RESET_SCRIPT")
                .map(PathBuf::from)
                .unwrap_or(defaults.reset_script),
            python: var("PIPELINE_PYTHON").unwrap_or(defaults.python),
        })
    }

    /// File on the host holding the backup for the active format.
    pub fn backup_file(&self) -> &Path {
        match self.backup_format {
            BackupFormat::SqlDump => &self.backup_path,
            BackupFormat::DuckDbFile => &self.duckdb_file,
        }
    }

    /// Readiness bound, `None` when waiting forever.
    pub fn readiness_timeout(&self) -> Option<Duration> {
        (!self.ready_timeout.is_zero()).then_some(self.ready_timeout)
    }
}

fn parse_secs(
    key: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The port number is invalid.
    #[error("Invalid port number: {0}")]
    InvalidPort(String),
    /// A numeric variable could not be parsed.
    #[error("Invalid value for {key}: {value}")]
    InvalidNumber {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },
    /// Unknown backup format.
    #[error("Unknown backup format: {0} (expected 'sql' or 'duckdb')")]
    InvalidBackupFormat(String),
}
