// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the lifecycle controller (init, start, inspect) against the mock runner.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{LogCapture, SAMPLE_DUMP, TestContext, when_running};
use pipeline_env::command::{MockCommandRunner, mock::DEFAULT_MOCK_STDOUT};
use pipeline_env::config::BackupFormat;
use pipeline_env::error::Error;
use pipeline_env::lifecycle::LifecycleState;

const UP_DB: &str = "docker compose up -d pipeline-db";
const UP_ALL: &str = "docker compose up -d";
const DROP: &str = "DROP DATABASE IF EXISTS";
const CREATE: &str = "CREATE DATABASE";
const IMPORT: &str = "psql -q -U airflow -d pipeline -v ON_ERROR_STOP=1";

/// Sequence number of the first invocation whose command line is exactly `line`.
async fn exact(runner: &MockCommandRunner, line: &str) -> Option<u64> {
    runner
        .invocations()
        .await
        .into_iter()
        .find(|i| i.spec.command_line() == line)
        .map(|i| i.seq)
}

// ============================================================================
// init
// ============================================================================

#[tokio::test]
async fn test_init_without_backup_creates_one() {
    let ctx = TestContext::new();
    assert!(ctx.read_backup().is_none());

    let path = ctx.controller().init().await.unwrap();

    assert_eq!(path, ctx.backup_path());
    assert_eq!(ctx.read_backup().as_deref(), Some(DEFAULT_MOCK_STDOUT));
    assert_eq!(ctx.runner.count(DROP).await, 0);
    assert_eq!(ctx.runner.count("run --rm airflow-init").await, 1);

    let up = exact(&ctx.runner, UP_DB).await.unwrap();
    let ready = ctx.runner.first("pg_isready").await.unwrap();
    let job = ctx.runner.first("airflow-init").await.unwrap();
    let dump = ctx.runner.first("pg_dump").await.unwrap();
    let stop = exact(&ctx.runner, "docker compose stop").await.unwrap();
    assert!(up < ready && ready < job && job < dump && dump < stop);
}

#[tokio::test]
async fn test_init_with_backup_restores_before_job() {
    let ctx = TestContext::new();
    ctx.write_backup(SAMPLE_DUMP);
    ctx.runner.stdout_for("pg_dump", "-- after init\n").await;

    ctx.controller().init().await.unwrap();

    let drop = ctx.runner.first(DROP).await.unwrap();
    let create = ctx.runner.first(CREATE).await.unwrap();
    let import = ctx.runner.first(IMPORT).await.unwrap();
    let job = ctx.runner.first("airflow-init").await.unwrap();
    assert!(drop < create && create < import && import < job);

    let log = ctx.runner.invocations().await;
    assert_eq!(log[import as usize].stdin.as_deref(), Some(SAMPLE_DUMP));
    assert_eq!(ctx.read_backup().as_deref(), Some("-- after init\n"));
}

#[tokio::test]
async fn test_init_job_failure_propagates_exit_code() {
    let ctx = TestContext::new();
    ctx.runner.fail_always("airflow-init", 3).await;
    let controller = ctx.controller();

    let err = controller.init().await.unwrap_err();

    assert!(matches!(err, Error::Command(_)));
    assert_eq!(err.exit_code(), 3);
    assert_eq!(ctx.runner.count("pg_dump").await, 0);
    assert!(ctx.read_backup().is_none());
    assert_eq!(ctx.runner.count("docker compose stop").await, 1);
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

// ============================================================================
// start
// ============================================================================

#[tokio::test]
async fn test_start_without_backup_refuses() {
    let ctx = TestContext::new();
    let controller = ctx.controller();

    let err = controller
        .start(when_running(controller.subscribe()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MissingBackup(ref p) if *p == ctx.backup_path()));
    assert_eq!(err.exit_code(), 1);
    assert!(exact(&ctx.runner, UP_ALL).await.is_none());
    assert_eq!(ctx.runner.count(DROP).await, 0);
    assert_eq!(ctx.runner.count("pg_dump").await, 0);
    assert_eq!(ctx.runner.count("docker compose down").await, 1);
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_start_with_backup_full_session() {
    let ctx = TestContext::new();
    ctx.write_backup(SAMPLE_DUMP);
    ctx.runner.stdout_for("pg_dump", "-- fresh dump\n").await;
    let controller = ctx.controller();

    controller
        .start(when_running(controller.subscribe()))
        .await
        .unwrap();

    assert_eq!(ctx.runner.count(DROP).await, 1);
    assert_eq!(ctx.runner.count(CREATE).await, 1);
    assert_eq!(ctx.runner.count(IMPORT).await, 1);

    let import = ctx.runner.first(IMPORT).await.unwrap();
    let up_all = exact(&ctx.runner, UP_ALL).await.unwrap();
    let dump = ctx.runner.first("pg_dump").await.unwrap();
    let down = ctx.runner.first("docker compose down").await.unwrap();
    assert!(import < up_all && up_all < dump && dump < down);

    assert_eq!(ctx.read_backup().as_deref(), Some("-- fresh dump\n"));
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_start_readiness_timeout_tears_down() {
    let mut ctx = TestContext::new();
    ctx.config.ready_timeout = Duration::from_millis(30);
    ctx.write_backup(SAMPLE_DUMP);
    ctx.runner.fail_always("pg_isready", 2).await;
    let controller = ctx.controller();

    let err = controller
        .start(when_running(controller.subscribe()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ReadinessTimeout { .. }));
    assert_eq!(ctx.runner.count(DROP).await, 0);
    assert_eq!(ctx.runner.count("docker compose down").await, 1);
    assert_eq!(ctx.read_backup().as_deref(), Some(SAMPLE_DUMP));
}

#[tokio::test]
async fn test_start_interrupted_during_startup_keeps_backup() {
    let ctx = TestContext::new();
    ctx.write_backup(SAMPLE_DUMP);
    ctx.runner.fail_always("pg_isready", 2).await;
    let controller = ctx.controller();

    controller
        .start(tokio::time::sleep(Duration::from_millis(30)))
        .await
        .unwrap();

    assert_eq!(ctx.runner.count("pg_dump").await, 0);
    assert!(exact(&ctx.runner, UP_ALL).await.is_none());
    assert_eq!(ctx.runner.count("docker compose down").await, 1);
    assert_eq!(ctx.read_backup().as_deref(), Some(SAMPLE_DUMP));
}

#[tokio::test]
async fn test_start_restore_failure_aborts() {
    let ctx = TestContext::new();
    ctx.write_backup(SAMPLE_DUMP);
    ctx.runner.fail_always(CREATE, 1).await;
    let controller = ctx.controller();

    let err = controller
        .start(when_running(controller.subscribe()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Command(_)));
    assert_eq!(ctx.runner.count(IMPORT).await, 0);
    assert!(exact(&ctx.runner, UP_ALL).await.is_none());
    assert_eq!(ctx.runner.count("docker compose down").await, 1);
}

// ============================================================================
// inspect
// ============================================================================

#[tokio::test]
async fn test_inspect_tolerates_probe_failures_before_restore() {
    let ctx = TestContext::new();
    ctx.write_backup(SAMPLE_DUMP);
    ctx.runner.fail_times("pg_isready", 3).await;
    let controller = ctx.controller();

    controller
        .inspect(when_running(controller.subscribe()))
        .await
        .unwrap();

    assert_eq!(ctx.runner.count("pg_isready").await, 4);
    let last_probe = ctx.runner.last("pg_isready").await.unwrap();
    let drop = ctx.runner.first(DROP).await.unwrap();
    assert!(last_probe < drop);
}

#[tokio::test]
async fn test_inspect_without_backup_continues_empty() {
    let ctx = TestContext::new();
    let controller = ctx.controller();

    controller
        .inspect(when_running(controller.subscribe()))
        .await
        .unwrap();

    assert_eq!(ctx.runner.count(DROP).await, 0);
    assert!(exact(&ctx.runner, UP_ALL).await.is_none());
    assert_eq!(ctx.read_backup().as_deref(), Some(DEFAULT_MOCK_STDOUT));
    assert_eq!(ctx.runner.count("docker compose stop pipeline-db").await, 1);
    assert_eq!(ctx.runner.count("docker compose down").await, 0);
}

#[tokio::test]
async fn test_snapshot_completes_before_stop() {
    let mut ctx = TestContext::new();
    ctx.runner = Arc::new(MockCommandRunner::with_delay(5));
    let controller = ctx.controller();

    controller
        .inspect(when_running(controller.subscribe()))
        .await
        .unwrap();

    let log = ctx.runner.invocations().await;
    let dump = log
        .iter()
        .find(|i| i.spec.program == "docker" && i.spec.command_line().contains("pg_dump"))
        .unwrap();
    let stop = log
        .iter()
        .find(|i| i.spec.command_line().contains("compose stop"))
        .unwrap();
    assert!(dump.seq < stop.seq);
    assert!(stop.at - dump.at >= chrono::Duration::milliseconds(5));
}

#[tokio::test]
async fn test_snapshot_failure_still_stops_services() {
    let ctx = TestContext::new();
    ctx.write_backup(SAMPLE_DUMP);
    ctx.runner.fail_always("pg_dump", 1).await;
    let controller = ctx.controller();

    let err = controller
        .inspect(when_running(controller.subscribe()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Command(_)));
    assert_eq!(ctx.runner.count("docker compose stop pipeline-db").await, 1);
    assert_eq!(ctx.read_backup().as_deref(), Some(SAMPLE_DUMP));
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

// ============================================================================
// DuckDB volume variant
// ============================================================================

#[tokio::test]
async fn test_duckdb_inspect_copies_through_volume() {
    let mut ctx = TestContext::new();
    ctx.config.backup_format = BackupFormat::DuckDbFile;
    ctx.write_backup("DUCK");
    let controller = ctx.controller();

    controller
        .inspect(when_running(controller.subscribe()))
        .await
        .unwrap();

    let probe = ctx
        .runner
        .first("docker volume inspect pipeline-data")
        .await
        .unwrap();
    let copy_in = ctx.runner.first(r#"rm -f "/data/$1""#).await.unwrap();
    let copy_out = ctx
        .runner
        .first(r#"cp "/data/$1" "/backup/$1""#)
        .await
        .unwrap();
    let stop = ctx.runner.first("compose stop").await.unwrap();
    assert!(probe < copy_in && copy_in < copy_out && copy_out < stop);
    assert_eq!(ctx.runner.count("pg_dump").await, 0);
    assert_eq!(ctx.runner.count(DROP).await, 0);
}

// ============================================================================
// Operator warnings
// ============================================================================

#[tokio::test]
async fn test_init_without_backup_warns() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let ctx = TestContext::new();

    ctx.controller().init().await.unwrap();

    let warnings = logs.warnings_containing("No backup found");
    assert_eq!(warnings.len(), 1, "{warnings:?}");
    assert!(warnings[0].contains("continuing with an empty database"));
}

#[tokio::test]
async fn test_inspect_without_backup_warns() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let ctx = TestContext::new();
    let controller = ctx.controller();

    controller
        .inspect(when_running(controller.subscribe()))
        .await
        .unwrap();

    let warnings = logs.warnings_containing("No backup found");
    assert_eq!(warnings.len(), 1, "{warnings:?}");
    assert!(warnings[0].contains("continuing with an empty database"));
}

#[tokio::test]
async fn test_start_without_backup_points_to_init() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let ctx = TestContext::new();
    let controller = ctx.controller();

    controller
        .start(when_running(controller.subscribe()))
        .await
        .unwrap_err();

    let warnings = logs.warnings_containing("No backup found");
    assert_eq!(warnings.len(), 1, "{warnings:?}");
    assert!(warnings[0].contains("pipeline-env init"));
    assert!(warnings[0].contains(&ctx.backup_path().display().to_string()));
}

#[tokio::test]
async fn test_init_with_backup_does_not_warn() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let ctx = TestContext::new();
    ctx.write_backup(SAMPLE_DUMP);

    ctx.controller().init().await.unwrap();

    assert!(logs.warnings_containing("No backup found").is_empty());
}
