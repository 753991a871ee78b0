// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for pipeline-env integration tests.
//!
//! Provides TestContext with a temporary data directory, a recording mock
//! runner and a controller wired to both.

#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pipeline_env::command::MockCommandRunner;
use pipeline_env::config::Config;
use pipeline_env::lifecycle::{Controller, LifecycleState};
use tokio::sync::watch;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Dump content used as the "existing" backup in tests.
pub const SAMPLE_DUMP: &str = "CREATE TABLE projects (id integer);\nINSERT INTO projects VALUES (1);\n";

/// Test context holding a temp data dir, mock runner and config.
pub struct TestContext {
    pub runner: Arc<MockCommandRunner>,
    pub config: Config,
    _temp_dir: tempfile::TempDir,
}

impl TestContext {
    /// Create a context whose backup lives in `<tmp>/data/pipeline_backup.sql`.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let config = Config {
            backup_path: temp_dir.path().join("data").join("pipeline_backup.sql"),
            duckdb_file: temp_dir.path().join("data").join("pipeline.duckdb"),
            ready_interval: Duration::from_millis(5),
            ready_timeout: Duration::from_secs(5),
            ..Config::default()
        };
        Self {
            runner: Arc::new(MockCommandRunner::new()),
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Backup path for the configured format.
    pub fn backup_path(&self) -> PathBuf {
        self.config.backup_file().to_path_buf()
    }

    /// Put a backup in place.
    pub fn write_backup(&self, content: &str) {
        let path = self.backup_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Read the backup back.
    pub fn read_backup(&self) -> Option<String> {
        std::fs::read_to_string(self.backup_path()).ok()
    }

    /// Controller using this context's config and mock runner.
    pub fn controller(&self) -> Controller {
        Controller::new(self.config.clone(), self.runner.clone())
    }
}

/// Shutdown future that fires as soon as the controller reports Running.
pub fn when_running(mut states: watch::Receiver<LifecycleState>) -> impl Future<Output = ()> {
    async move {
        states
            .wait_for(|s| *s == LifecycleState::Running)
            .await
            .expect("controller dropped its state channel");
    }
}

/// In-memory sink for log output of the current test thread.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Route this thread's tracing output into the capture until the guard drops.
    ///
    /// Only sees events from the test thread, so use it with the default
    /// current-thread `#[tokio::test]` runtime.
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Captured lines at WARN level containing `text`.
    pub fn warnings_containing(&self, text: &str) -> Vec<String> {
        let buffer = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter(|line| line.contains(" WARN ") && line.contains(text))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
