// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process signal handling.

use tracing::{error, info};

#[cfg(unix)]
fn install(kind: tokio::signal::unix::SignalKind, name: &'static str) -> Option<tokio::signal::unix::Signal> {
    match tokio::signal::unix::signal(kind) {
        Ok(signal) => Some(signal),
        Err(e) => {
            error!(error = %e, signal = name, "Failed to install signal handler");
            None
        }
    }
}

#[cfg(unix)]
async fn recv(signal: Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(mut signal) => {
            signal.recv().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolve on the first SIGINT (Ctrl+C) or SIGTERM.
///
/// Handlers are installed when this is called, not when the future is first
/// polled, so an interrupt during start-up never kills the process outright.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    use tokio::signal::unix::SignalKind;

    let interrupt = install(SignalKind::interrupt(), "SIGINT");
    let terminate = install(SignalKind::terminate(), "SIGTERM");

    async move {
        tokio::select! {
            () = recv(interrupt) => info!("Received SIGINT"),
            () = recv(terminate) => info!("Received SIGTERM"),
        }
    }
}

/// Resolve on the first Ctrl+C.
#[cfg(not(unix))]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
    }
}
