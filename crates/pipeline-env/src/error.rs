// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for pipeline-env.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Controller errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// An external command failed.
    #[error("Command error: {0}")]
    Command(#[from] crate::command::CommandError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The database never answered its readiness probe.
    #[error("Service {service} not ready after {}s", .waited.as_secs())]
    ReadinessTimeout {
        /// Service that was probed.
        service: String,
        /// How long the controller waited.
        waited: Duration,
    },

    /// A backup is required but does not exist.
    #[error("No backup found at {}; run `pipeline-env init` first", .0.display())]
    MissingBackup(PathBuf),
}

impl Error {
    /// Process exit code this error maps to.
    ///
    /// A failed external command hands its own exit code back to the caller.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Command(err) => process_exit_code(err.exit_code())
                .filter(|code| *code != 0)
                .unwrap_or(1),
            _ => 1,
        }
    }
}

/// Child exit code as a process exit code.
///
/// `None` for a child killed by a signal or a code outside 0..=255.
pub fn process_exit_code(code: Option<i32>) -> Option<u8> {
    code.and_then(|code| u8::try_from(code).ok())
}

/// Result type using the controller Error.
pub type Result<T> = std::result::Result<T, Error>;
