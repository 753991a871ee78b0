// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Environment lifecycle controller.
//!
//! ```text
//! ┌──────────┐ probe ok ┌───────┐ restored ┌─────────┐ shutdown ┌──────────────┐ backup+stop ┌─────────┐
//! │ STARTING │─────────►│ READY │─────────►│ RUNNING │─────────►│ SHUTTING_DOWN│────────────►│ STOPPED │
//! └──────────┘          └───────┘          └─────────┘          └──────────────┘             └─────────┘
//! ```
//!
//! Cancellation is a future handed to [`Controller::start`] and
//! [`Controller::inspect`]. Once the controller is running, resolving that
//! future triggers the teardown, which always completes before the call
//! returns: the database is snapshotted first, containers are stopped second.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::{Pin, pin};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::command::CommandRunner;
use crate::compose::Compose;
use crate::config::Config;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::readiness::wait_until_ready;

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Services launching, readiness poll in progress.
    Starting,
    /// Database answered its probe, restore in progress.
    Ready,
    /// Everything is up, waiting for shutdown.
    Running,
    /// Taking the backup and stopping services.
    ShuttingDown,
    /// Teardown finished.
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Ready => "ready",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
        })
    }
}

/// How containers are brought down at the end of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Stop the database container, keep it for next time.
    StopDatabase,
    /// Stop every container of the project, keep them.
    StopAll,
    /// Stop and remove every container of the project.
    Down,
}

/// Drives compose services through their lifecycle.
pub struct Controller {
    config: Config,
    runner: Arc<dyn CommandRunner>,
    compose: Compose,
    database: Database,
    state: watch::Sender<LifecycleState>,
}

impl Controller {
    /// Create a controller for `config` executing commands through `runner`.
    pub fn new(config: Config, runner: Arc<dyn CommandRunner>) -> Self {
        let (state, _) = watch::channel(LifecycleState::Stopped);
        Self {
            compose: Compose::from_config(&config),
            database: Database::from_config(&config),
            config,
            runner,
            state,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// The database this controller manages.
    pub fn database(&self) -> &Database {
        &self.database
    }

    fn set_state(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        debug!(from = %previous, to = %next, "Lifecycle transition");
    }

    async fn bring_up_database(&self) -> Result<()> {
        let service = self.database.service();
        info!(service = %service, "Starting database service");
        self.runner.check(&self.compose.up(&[service])).await?;
        wait_until_ready(
            self.runner.as_ref(),
            service,
            &self.database.probe_spec(),
            self.config.ready_interval,
            self.config.readiness_timeout(),
        )
        .await?;
        Ok(())
    }

    /// Restore when a backup exists, otherwise continue with an empty database.
    async fn restore_if_present(&self) -> Result<bool> {
        if self.database.backup_exists().await? {
            self.database.restore(self.runner.as_ref()).await?;
            Ok(true)
        } else {
            warn!(
                backup = %self.database.backup_file().display(),
                "No backup found, continuing with an empty database"
            );
            Ok(false)
        }
    }

    async fn tear_down(&self, teardown: Teardown) -> Result<()> {
        let spec = match teardown {
            Teardown::StopDatabase => self.compose.stop(&[self.database.service()]),
            Teardown::StopAll => self.compose.stop(&[]),
            Teardown::Down => self.compose.down(),
        };
        info!(?teardown, "Stopping services");
        self.runner.check(&spec).await?;
        Ok(())
    }

    /// Best-effort teardown after a failed or interrupted start-up.
    async fn abort(&self, teardown: Teardown) {
        self.set_state(LifecycleState::ShuttingDown);
        if let Err(e) = self.tear_down(teardown).await {
            error!(error = %e, "Failed to stop services");
        }
        self.set_state(LifecycleState::Stopped);
    }

    /// Run start-up, racing it against `shutdown`.
    ///
    /// Returns `Ok(true)` when start-up finished and `Ok(false)` when the
    /// shutdown fired first. No backup is taken in the latter case since the
    /// database may be half restored.
    async fn start_up<S, F>(
        &self,
        startup: S,
        shutdown: Pin<&mut F>,
        teardown: Teardown,
    ) -> Result<bool>
    where
        S: Future<Output = Result<()>>,
        F: Future<Output = ()>,
    {
        self.set_state(LifecycleState::Starting);
        tokio::select! {
            result = startup => match result {
                Ok(()) => Ok(true),
                Err(e) => {
                    match &e {
                        Error::MissingBackup(path) => warn!(
                            backup = %path.display(),
                            "No backup found, run `pipeline-env init` first"
                        ),
                        other => error!(error = %other, "Start-up failed"),
                    }
                    self.abort(teardown).await;
                    Err(e)
                }
            },
            () = shutdown => {
                warn!("Interrupted during start-up, skipping backup");
                self.abort(teardown).await;
                Ok(false)
            }
        }
    }

    /// Park until `shutdown` resolves, then back up and stop.
    ///
    /// The snapshot always finishes before any stop command is issued. A
    /// failed snapshot does not keep services running: teardown still happens
    /// and the snapshot error is returned afterwards.
    async fn run_until<F>(&self, shutdown: Pin<&mut F>, teardown: Teardown) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.set_state(LifecycleState::Running);
        info!("Environment running, press Ctrl+C to stop");

        shutdown.await;

        info!("Shutdown signal received");
        self.set_state(LifecycleState::ShuttingDown);

        let snapshot = self.database.snapshot(self.runner.as_ref()).await;
        if let Err(e) = &snapshot {
            error!(error = %e, "Failed to save backup");
        }
        let stopped = self.tear_down(teardown).await;

        self.set_state(LifecycleState::Stopped);
        snapshot?;
        stopped?;
        info!("Environment stopped");
        Ok(())
    }

    /// First-time setup.
    ///
    /// Starts the database, restores the backup if there is one, runs the
    /// one-shot init job, saves a fresh backup and stops the project. Returns
    /// the backup path.
    pub async fn init(&self) -> Result<PathBuf> {
        self.set_state(LifecycleState::Starting);
        let result = async {
            self.bring_up_database().await?;
            self.set_state(LifecycleState::Ready);
            self.restore_if_present().await?;

            info!(
                service = %self.config.init_service,
                profile = %self.config.init_profile,
                "Running one-shot initialization"
            );
            self.runner
                .check(
                    &self
                        .compose
                        .run_once(&self.config.init_profile, &self.config.init_service),
                )
                .await?;

            self.set_state(LifecycleState::ShuttingDown);
            self.database.snapshot(self.runner.as_ref()).await
        }
        .await;

        match result {
            Ok(path) => {
                let stopped = self.tear_down(Teardown::StopAll).await;
                self.set_state(LifecycleState::Stopped);
                stopped?;
                info!(backup = %path.display(), "Initialization complete");
                Ok(path)
            }
            Err(e) => {
                error!(error = %e, "Initialization failed");
                self.abort(Teardown::StopAll).await;
                Err(e)
            }
        }
    }

    /// Bring up the full service set from the mandatory backup.
    ///
    /// Blocks until `shutdown` resolves, then saves the backup and removes
    /// all containers.
    pub async fn start<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = pin!(shutdown);
        let startup = async {
            self.bring_up_database().await?;
            if !self.database.backup_exists().await? {
                return Err(Error::MissingBackup(
                    self.database.backup_file().to_path_buf(),
                ));
            }
            self.set_state(LifecycleState::Ready);
            self.database.restore(self.runner.as_ref()).await?;

            info!("Starting all services");
            self.runner.check(&self.compose.up(&[])).await?;
            Ok::<(), Error>(())
        };

        if !self
            .start_up(startup, shutdown.as_mut(), Teardown::Down)
            .await?
        {
            return Ok(());
        }
        self.run_until(shutdown, Teardown::Down).await
    }

    /// Bring up only the database for interactive use.
    ///
    /// Blocks until `shutdown` resolves, then saves the backup and stops
    /// (without removing) the database container.
    pub async fn inspect<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = pin!(shutdown);
        let startup = async {
            self.bring_up_database().await?;
            self.set_state(LifecycleState::Ready);
            self.restore_if_present().await?;
            Ok::<(), Error>(())
        };

        if !self
            .start_up(startup, shutdown.as_mut(), Teardown::StopDatabase)
            .await?
        {
            return Ok(());
        }
        self.run_until(shutdown, Teardown::StopDatabase).await
    }
}
