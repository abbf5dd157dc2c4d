//! Cascade Server - Main entry point
//!
//! Serves the cascade tracking API and keeps the in-memory store persisted
//! to a snapshot file when one is configured.

use std::sync::Arc;

use cascade_core::{
    api::{self, AppState},
    config::Config,
    feed::SummaryFeed,
    store::{MemoryStore, PropagationStore, SnapshotFile},
    telemetry,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match std::env::var("CASCADE_CONFIG") {
        Ok(path) => Config::from_file(&path),
        Err(_) => Config::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    // Initialize logging and metrics
    let telemetry = telemetry::init_telemetry(&config.telemetry)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Cascade Server"
    );

    let store = Arc::new(MemoryStore::new());
    let snapshots = config.store.snapshot_path.clone().map(SnapshotFile::new);

    // Restore from the last snapshot
    if let Some(file) = snapshots.as_ref().filter(|_| config.store.restore_on_start) {
        if let Some(snapshot) = file.load()? {
            let rebuilds = store.restore(snapshot)?;
            let drifted = rebuilds.iter().filter(|r| r.drifted).count();
            tracing::info!(
                cascades = rebuilds.len(),
                drifted,
                path = %file.path().display(),
                "Store restored from snapshot"
            );
        }
    }

    // Periodic snapshots
    let (stop_tx, stop_rx) = watch::channel(false);
    let snapshot_task = snapshots.clone().map(|file| {
        tokio::spawn(snapshot_loop(
            Arc::clone(&store),
            file,
            config.store.snapshot_interval,
            stop_rx,
        ))
    });

    // Build router
    let feed = SummaryFeed::new(config.feed.capacity);
    let app_state = AppState::new(store.clone(), feed, telemetry.metrics.clone());
    let app = api::build_router(app_state);

    // Start server
    let addr = config.server.bind_address();
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the snapshot loop, then write a final snapshot
    let _ = stop_tx.send(true);
    if let Some(task) = snapshot_task {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Snapshot task ended abnormally");
        }
    }
    if let Some(file) = snapshots {
        file.save(&store.snapshot())?;
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Write a snapshot every `interval` until told to stop.
async fn snapshot_loop(
    store: Arc<MemoryStore>,
    file: SnapshotFile,
    interval: std::time::Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }

        let store = Arc::clone(&store);
        let file = file.clone();
        let result = tokio::task::spawn_blocking(move || file.save(&store.snapshot())).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => e.log(),
            Err(e) => tracing::error!(error = %e, "Snapshot task panicked"),
        }
    }
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
