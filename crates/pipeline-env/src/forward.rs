// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pass-through to the database maintenance script.
//!
//! `pipeline-env db status|reset|reseed|full-reset [...]` runs the maintenance
//! script against the locally exposed database. Sub-commands and flags are
//! not interpreted here, the only thing added is where the database lives.

use tracing::info;

use crate::command::{CommandRunner, CommandSpec};
use crate::config::Config;
use crate::error::{Result, process_exit_code};

/// Host variable read by the maintenance script.
pub const HOST_VAR: &str = "PIPELINE_DB_HOST";
/// Port variable read by the maintenance script.
pub const PORT_VAR: &str = "PIPELINE_DB_PORT";

/// Build the maintenance script invocation for `args`.
pub fn forward_spec<I, S>(config: &Config, args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new(&config.python)
        .arg(config.reset_script.to_string_lossy())
        .args(args)
        .env(HOST_VAR, &config.db_host)
        .env(PORT_VAR, config.db_port.to_string())
        .interactive()
}

/// Run the maintenance script and return its exit code.
///
/// A script killed by a signal, or exiting outside 0..=255, reports 1.
pub async fn forward(runner: &dyn CommandRunner, config: &Config, args: &[String]) -> Result<u8> {
    let spec = forward_spec(config, args.iter().cloned());
    info!(
        script = %config.reset_script.display(),
        host = %config.db_host,
        port = config.db_port,
        "Forwarding to maintenance script"
    );
    let output = runner.run(&spec).await?;
    Ok(process_exit_code(output.exit_code).unwrap_or(1))
}
