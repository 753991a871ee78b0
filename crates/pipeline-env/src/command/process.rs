// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process runner implementation.
//!
//! Spawns real child processes with `tokio::process`. Stdout redirects are
//! written to a staging file next to the target and renamed over it once the
//! command succeeds, so a failed dump never clobbers the previous backup.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, warn};

use super::traits::{CommandError, CommandOutput, CommandRunner, CommandSpec, Result};

/// Maximum number of stderr bytes kept in errors.
const STDERR_PREVIEW_LIMIT: usize = 2000;

/// Runner that executes commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a new process runner.
    pub fn new() -> Self {
        Self
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    target.with_file_name(name)
}

/// Removes the staging file unless the redirect was committed.
///
/// Also runs when the `run` future is dropped mid-command.
struct StagingGuard {
    path: Option<PathBuf>,
}

impl StagingGuard {
    fn commit(&mut self) {
        self.path = None;
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn stderr_preview(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.len() > STDERR_PREVIEW_LIMIT {
        let mut end = STDERR_PREVIEW_LIMIT;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    fn runner_type(&self) -> &'static str {
        "process"
    }

    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).envs(&spec.env).kill_on_drop(true);

        match &spec.stdin {
            Some(path) => {
                let file = fs::File::open(path).await?.into_std().await;
                cmd.stdin(Stdio::from(file));
            }
            None if spec.inherit_stdio => {
                cmd.stdin(Stdio::inherit());
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        let mut staging = StagingGuard {
            path: spec.stdout.as_deref().map(staging_path),
        };
        match &staging.path {
            Some(path) => {
                let file = fs::File::create(path).await?.into_std().await;
                cmd.stdout(Stdio::from(file));
            }
            None if spec.inherit_stdio => {
                cmd.stdout(Stdio::inherit());
            }
            None => {
                cmd.stdout(Stdio::null());
            }
        }

        if spec.inherit_stdio {
            cmd.stderr(Stdio::inherit());
        } else {
            cmd.stderr(Stdio::piped());
        }

        debug!(command = %spec, "Running command");

        // Command::output() would force stdout to a pipe, so spawn and wait instead.
        // Dropping this future kills the child and removes the staging file.
        let child = cmd.spawn().map_err(|e| CommandError::Spawn {
            program: spec.program.clone(),
            source: e,
        })?;
        let result = child.wait_with_output().await?;

        let output = CommandOutput {
            exit_code: result.status.code(),
            stderr: stderr_preview(&result.stderr),
        };

        if let Some(target) = &spec.stdout {
            if output.success() {
                if let Some(path) = &staging.path {
                    fs::rename(path, target).await?;
                    staging.commit();
                }
            } else {
                warn!(
                    target = %target.display(),
                    exit_code = ?output.exit_code,
                    "Command failed, keeping previous output file"
                );
            }
        }

        debug!(
            program = %spec.program,
            exit_code = ?output.exit_code,
            "Command finished"
        );

        Ok(output)
    }
}
