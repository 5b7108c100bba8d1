//! Serve mode: sync on start, optionally resync on an interval, exit on signal.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::sync::SyncService;

/// Run until SIGINT or SIGTERM. Sync failures are logged, never fatal.
///
/// A zero `interval` runs the initial sync only and then idles.
pub async fn run(service: &SyncService, interval: Duration) -> Result<()> {
    info!("Starting sync service");
    if interval.is_zero() {
        info!("Periodic resync disabled");
    } else {
        info!("Resync every {:?}", interval);
    }

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(());
    });

    let mut round = 0u64;
    loop {
        round += 1;
        tokio::select! {
            result = service.sync_all() => match result {
                Ok(reports) => info!(round, entities = reports.len(), "Sync round complete"),
                Err(e) => error!(round, "Sync round failed: {}", e),
            },
            _ = shutdown_rx.recv() => {
                warn!(round, "Shutdown during sync, abandoning current round");
                break;
            }
        }

        if interval.is_zero() {
            let _ = shutdown_rx.recv().await;
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_rx.recv() => break,
        }
    }

    info!("Sync service stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
