// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Readiness polling.
//!
//! Container start-up time is unpredictable, so the probe is retried at a
//! fixed interval until it succeeds. Probe failures, including failures to
//! spawn the probe, are never surfaced; only the optional overall bound is.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{Error, Result};

/// Poll `probe` every `interval` until it exits 0.
///
/// Returns the number of attempts made. With `timeout` set, gives up with
/// [`Error::ReadinessTimeout`] once that much time has passed without a
/// successful probe, including while a probe is still running; with `None`
/// it waits forever.
pub async fn wait_until_ready(
    runner: &dyn CommandRunner,
    service: &str,
    probe: &CommandSpec,
    interval: Duration,
    timeout: Option<Duration>,
) -> Result<u32> {
    let started = Instant::now();
    let mut attempts = 0u32;

    info!(service = %service, "Waiting for service to become ready");

    let timed_out = || Error::ReadinessTimeout {
        service: service.to_string(),
        waited: started.elapsed(),
    };

    loop {
        attempts += 1;
        let attempt = runner.run(probe);
        let result = match timeout {
            // A hung probe counts against the overall bound.
            Some(limit) => {
                match tokio::time::timeout(limit.saturating_sub(started.elapsed()), attempt).await
                {
                    Ok(result) => result,
                    Err(_) => {
                        debug!(service = %service, attempts, "Probe still running at deadline");
                        return Err(timed_out());
                    }
                }
            }
            None => attempt.await,
        };
        match result {
            Ok(output) if output.success() => {
                info!(
                    service = %service,
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Service is ready"
                );
                return Ok(attempts);
            }
            Ok(output) => {
                debug!(service = %service, attempts, exit_code = ?output.exit_code, "Not ready yet");
            }
            Err(e) => {
                debug!(service = %service, attempts, error = %e, "Probe failed to run");
            }
        }

        if let Some(limit) = timeout
            && started.elapsed() + interval > limit
        {
            return Err(timed_out());
        }

        tokio::time::sleep(interval).await;
    }
}
