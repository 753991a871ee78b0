// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command runner trait definitions.
//!
//! Every external tool the controller drives (`docker compose`, `pg_isready`,
//! `pg_dump`, `psql`, the maintenance script) goes through this interface.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from command execution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommandError {
    /// The program could not be started.
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// Process exited with non-zero code.
    #[error("{program} exited with code {exit_code}: {stderr}")]
    ExitStatus {
        /// Program that failed.
        program: String,
        /// Exit code from the process.
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// Process was killed by a signal before exiting.
    #[error("{program} terminated by signal")]
    Terminated {
        /// Program that was killed.
        program: String,
    },

    /// I/O operation on a redirect file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    /// Exit code of the failed process, if it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::ExitStatus { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, CommandError>;

/// A fully described external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path
    pub program: String,
    /// Arguments, passed through untouched
    pub args: Vec<String>,
    /// Variables added to the inherited environment
    pub env: BTreeMap<String, String>,
    /// File streamed into the child's stdin
    pub stdin: Option<PathBuf>,
    /// File receiving the child's stdout (replaced only on success)
    pub stdout: Option<PathBuf>,
    /// Attach the child to the controller's terminal
    pub inherit_stdio: bool,
}

impl CommandSpec {
    /// Create a command for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Stream `path` into stdin.
    pub fn stdin_from(mut self, path: impl AsRef<Path>) -> Self {
        self.stdin = Some(path.as_ref().to_path_buf());
        self
    }

    /// Redirect stdout into `path`.
    pub fn stdout_to(mut self, path: impl AsRef<Path>) -> Self {
        self.stdout = Some(path.as_ref().to_path_buf());
        self
    }

    /// Inherit the terminal's stdin, stdout and stderr.
    pub fn interactive(mut self) -> Self {
        self.inherit_stdio = true;
        self
    }

    /// Shell-like rendering used in logs and test assertions.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.command_line())?;
        if let Some(path) = &self.stdin {
            write!(f, " < {}", path.display())?;
        }
        if let Some(path) = &self.stdout {
            write!(f, " > {}", path.display())?;
        }
        Ok(())
    }
}

/// Outcome of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard error (empty for interactive commands).
    pub stderr: String,
}

impl CommandOutput {
    /// Output of a process that exited with `code`.
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            stderr: String::new(),
        }
    }

    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for command runners.
///
/// Runners only execute; ordering, retries and error policy belong to the
/// caller.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runner type identifier (e.g., "process", "mock")
    fn runner_type(&self) -> &'static str;

    /// Run a command to completion and report how it exited.
    ///
    /// A non-zero exit is not an error here; only failing to start the
    /// process or to open its redirect files is.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run a command and fail on any non-zero exit.
    async fn check(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = self.run(spec).await?;
        match output.exit_code {
            Some(0) => Ok(output),
            Some(exit_code) => Err(CommandError::ExitStatus {
                program: spec.program.clone(),
                exit_code,
                stderr: output.stderr,
            }),
            None => Err(CommandError::Terminated {
                program: spec.program.clone(),
            }),
        }
    }
}
