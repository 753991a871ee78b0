// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock command runner for testing.
//!
//! Records every command instead of executing it and answers with scripted
//! exit codes. Stdout redirects receive scripted content so dump commands
//! leave a file behind, and stdin files are read so restores can be checked
//! for what they would have streamed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use super::traits::*;

/// Content written to stdout redirects when no rule provides any.
pub const DEFAULT_MOCK_STDOUT: &str = "-- mock dump\n";

/// A recorded command invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Position in the invocation log, starting at 0
    pub seq: u64,
    /// When the command was issued
    pub at: DateTime<Utc>,
    /// The command as issued
    pub spec: CommandSpec,
    /// Content of the stdin file at the time of the call
    pub stdin: Option<String>,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    /// Exit codes for the next matching calls, consumed front to back
    scripted: Vec<i32>,
    /// Exit code once `scripted` is exhausted
    fallback: i32,
    stdout: Option<String>,
}

/// Mock runner for testing.
pub struct MockCommandRunner {
    rules: Mutex<Vec<Rule>>,
    log: Mutex<Vec<Invocation>>,
    seq: AtomicU64,
    /// Optional delay to simulate execution time (in milliseconds)
    pub execution_delay_ms: u64,
}

impl Default for MockCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCommandRunner {
    /// Create a mock runner where every command succeeds.
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
            execution_delay_ms: 0,
        }
    }

    /// Create a mock runner that takes `execution_delay_ms` per command.
    pub fn with_delay(execution_delay_ms: u64) -> Self {
        Self {
            execution_delay_ms,
            ..Self::new()
        }
    }

    /// Fail the first `times` commands containing `pattern`, then succeed.
    pub async fn fail_times(&self, pattern: &str, times: usize) {
        self.rules.lock().await.push(Rule {
            pattern: pattern.to_string(),
            scripted: vec![1; times],
            fallback: 0,
            stdout: None,
        });
    }

    /// Fail every command containing `pattern` with `exit_code`.
    pub async fn fail_always(&self, pattern: &str, exit_code: i32) {
        self.rules.lock().await.push(Rule {
            pattern: pattern.to_string(),
            scripted: Vec::new(),
            fallback: exit_code,
            stdout: None,
        });
    }

    /// Write `content` to the stdout redirect of commands containing `pattern`.
    pub async fn stdout_for(&self, pattern: &str, content: &str) {
        self.rules.lock().await.push(Rule {
            pattern: pattern.to_string(),
            scripted: Vec::new(),
            fallback: 0,
            stdout: Some(content.to_string()),
        });
    }

    /// All invocations so far, in issue order.
    pub async fn invocations(&self) -> Vec<Invocation> {
        self.log.lock().await.clone()
    }

    /// Command lines of all invocations so far.
    pub async fn command_lines(&self) -> Vec<String> {
        self.log
            .lock()
            .await
            .iter()
            .map(|i| i.spec.command_line())
            .collect()
    }

    /// Number of invocations containing `pattern`.
    pub async fn count(&self, pattern: &str) -> usize {
        self.log
            .lock()
            .await
            .iter()
            .filter(|i| i.spec.command_line().contains(pattern))
            .count()
    }

    /// Sequence number of the first invocation containing `pattern`.
    pub async fn first(&self, pattern: &str) -> Option<u64> {
        self.log
            .lock()
            .await
            .iter()
            .find(|i| i.spec.command_line().contains(pattern))
            .map(|i| i.seq)
    }

    /// Sequence number of the last invocation containing `pattern`.
    pub async fn last(&self, pattern: &str) -> Option<u64> {
        self.log
            .lock()
            .await
            .iter()
            .rev()
            .find(|i| i.spec.command_line().contains(pattern))
            .map(|i| i.seq)
    }

    async fn resolve(&self, line: &str) -> (i32, Option<String>) {
        let mut rules = self.rules.lock().await;
        let mut exit_code = 0;
        let mut stdout = None;
        for rule in rules.iter_mut().filter(|r| line.contains(&r.pattern)) {
            let code = if rule.scripted.is_empty() {
                rule.fallback
            } else {
                rule.scripted.remove(0)
            };
            if exit_code == 0 {
                exit_code = code;
            }
            if stdout.is_none() {
                stdout = rule.stdout.clone();
            }
        }
        (exit_code, stdout)
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    fn runner_type(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let stdin = match &spec.stdin {
            Some(path) => Some(tokio::fs::read_to_string(path).await?),
            None => None,
        };

        {
            let mut log = self.log.lock().await;
            log.push(Invocation {
                seq: self.seq.fetch_add(1, Ordering::SeqCst),
                at: Utc::now(),
                spec: spec.clone(),
                stdin,
            });
        }

        if self.execution_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.execution_delay_ms)).await;
        }

        let (exit_code, stdout) = self.resolve(&spec.command_line()).await;

        if exit_code == 0
            && let Some(target) = &spec.stdout
        {
            let content = stdout.as_deref().unwrap_or(DEFAULT_MOCK_STDOUT);
            tokio::fs::write(target, content).await?;
        }

        Ok(CommandOutput {
            exit_code: Some(exit_code),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                "mock failure".to_string()
            },
        })
    }
}
