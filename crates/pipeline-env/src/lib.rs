// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! pipeline-env - local environment lifecycle controller
//!
//! Drives the data pipeline's development environment through
//! `docker compose`: brings services up, waits for the database, restores the
//! last backup, runs the one-shot Airflow initialization, and on shutdown
//! saves a fresh backup before stopping containers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                   pipeline-env (CLI binary)                       │
//! │        init │ start │ inspect │ db <args...>                      │
//! └──────────────────────────────────────────────────────────────────┘
//!                 │                                  │
//!                 ▼                                  ▼
//! ┌──────────────────────────────────┐   ┌──────────────────────────┐
//! │            Controller            │   │        forward           │
//! │  readiness │ database │ compose  │   │ scripts/reset_db.py      │
//! └──────────────────────────────────┘   └──────────────────────────┘
//!                 │                                  │
//!                 ▼                                  ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        CommandRunner                              │
//! │         ProcessRunner (tokio::process) │ MockCommandRunner        │
//! └──────────────────────────────────────────────────────────────────┘
//!                 │
//!                 ▼
//!     docker compose, pg_isready, pg_dump, psql, python3
//! ```
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `init` | Start the database, restore if a backup exists, run `airflow-init`, save a backup |
//! | `start` | Restore the mandatory backup, start every service, back up and `down` on Ctrl+C |
//! | `inspect` | Start only the database, back up and `stop` on Ctrl+C |
//! | `db <args>` | Run the maintenance script with `PIPELINE_DB_HOST`/`PIPELINE_DB_PORT` set |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables (and `.env`):
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PIPELINE_COMPOSE_FILE` | - | Extra compose file (`-f`) |
//! | `PIPELINE_COMPOSE_PROJECT` | - | Compose project name (`-p`) |
//! | `PIPELINE_DB_SERVICE` | `pipeline-db` | Database service |
//! | `PIPELINE_DB_HOST` | `localhost` | Host given to the maintenance script |
//! | `PIPELINE_DB_PORT` | `5433` | Port given to the maintenance script |
//! | `PIPELINE_DB_NAME` | `pipeline` | Logical database |
//! | `PIPELINE_DB_USER` | `airflow` | Database role |
//! | `PIPELINE_DB_PASSWORD` | - | Exported as `PGPASSWORD` inside the container |
//! | `PIPELINE_DB_MAINTENANCE` | `postgres` | Database used for DROP/CREATE |
//! | `PIPELINE_BACKUP_FORMAT` | `sql` | `sql` or `duckdb` |
//! | `PIPELINE_BACKUP_PATH` | `./data/pipeline_backup.sql` | SQL dump |
//! | `PIPELINE_DUCKDB_VOLUME` | `pipeline-data` | Volume holding the DuckDB file |
//! | `PIPELINE_DUCKDB_FILE` | `./data/pipeline.duckdb` | Host copy of the DuckDB file |
//! | `PIPELINE_READY_INTERVAL_SECS` | `2` | Readiness probe interval |
//! | `PIPELINE_READY_TIMEOUT_SECS` | `300` | Readiness bound, `0` waits forever |
//! | `PIPELINE_INIT_SERVICE` | `airflow-init` | One-shot init service |
//! | `PIPELINE_INIT_PROFILE` | `init` | Profile enabling the init service |
//! | `PIPELINE_RESET_SCRIPT` | `scripts/reset_db.py` | Maintenance script |
//! | `PIPELINE_PYTHON` | `python3` | Interpreter for the maintenance script |
//!
//! # Modules
//!
//! - [`config`]: Controller configuration from environment variables
//! - [`command`]: External command execution (process and mock backends)
//! - [`compose`]: `docker compose` invocations
//! - [`database`]: Readiness probe, restore and snapshot
//! - [`readiness`]: Bounded readiness polling
//! - [`lifecycle`]: The controller and its state machine
//! - [`forward`]: Maintenance script pass-through
//! - [`signal`]: SIGINT/SIGTERM shutdown future

#![deny(missing_docs)]

/// Controller configuration loaded from environment variables.
pub mod config;

/// Error types for controller operations.
pub mod error;

/// External command execution backends.
pub mod command;

/// `docker compose` command construction.
pub mod compose;

/// Database readiness probe, restore and snapshot.
pub mod database;

/// Readiness polling.
pub mod readiness;

/// Lifecycle controller.
pub mod lifecycle;

/// Maintenance script pass-through.
pub mod forward;

/// Shutdown signal handling.
pub mod signal;

pub use config::Config;
pub use error::Error;
pub use lifecycle::{Controller, LifecycleState};
