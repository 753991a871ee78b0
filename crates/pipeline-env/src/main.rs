// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! pipeline-env - local environment lifecycle controller
//!
//! Usage:
//!   pipeline-env init                 First-time setup, leaves a fresh backup
//!   pipeline-env start                Full stack from the backup, Ctrl+C to back up and remove
//!   pipeline-env inspect              Database only, Ctrl+C to back up and stop
//!   pipeline-env db <args...>         Forward to scripts/reset_db.py

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use pipeline_env::command::ProcessRunner;
use pipeline_env::config::{BackupFormat, Config};
use pipeline_env::forward::forward;
use pipeline_env::lifecycle::Controller;
use pipeline_env::signal::shutdown_signal;

#[derive(Debug, Parser)]
#[command(name = "pipeline-env", version, about = "Local environment lifecycle controller for the data pipeline")]
struct Cli {
    /// Backup file location (overrides PIPELINE_BACKUP_PATH / PIPELINE_DUCKDB_FILE)
    #[arg(long, global = true)]
    backup_path: Option<PathBuf>,

    /// Give up waiting for the database after this many seconds, 0 waits forever
    #[arg(long, global = true)]
    ready_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the database, restore any backup, run the one-shot init job and save a backup
    Init,
    /// Start every service from the backup and block until interrupted
    Start,
    /// Start only the database for interactive use and block until interrupted
    Inspect,
    /// Forward arguments to the database maintenance script (status, reset, reseed, full-reset)
    Db {
        /// Arguments passed through unchanged
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn apply_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(path) = &cli.backup_path {
        match config.backup_format {
            BackupFormat::SqlDump => config.backup_path = path.clone(),
            BackupFormat::DuckDbFile => config.duckdb_file = path.clone(),
        }
    }
    if let Some(secs) = cli.ready_timeout {
        config.ready_timeout = Duration::from_secs(secs);
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipeline_env=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = apply_overrides(Config::from_env()?, &cli);
    let runner = Arc::new(ProcessRunner::new());

    info!(
        db_service = %config.db_service,
        backup = %config.backup_file().display(),
        "pipeline-env starting"
    );

    let result = match &cli.command {
        Command::Db { args } => {
            let code = forward(runner.as_ref(), &config, args).await?;
            return Ok(ExitCode::from(code));
        }
        Command::Init => Controller::new(config, runner).init().await.map(|_| ()),
        Command::Start => Controller::new(config, runner).start(shutdown_signal()).await,
        Command::Inspect => {
            Controller::new(config, runner)
                .inspect(shutdown_signal())
                .await
        }
    };

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!(error = %e, "pipeline-env failed");
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}
