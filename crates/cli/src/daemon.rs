//! Daemon lifecycle management
//!
//! Startup order matters: everything that can reject the configuration runs
//! before the watcher is started, so a bad setup never watches anything.

use anyhow::{Context, Result};
use history::{sweep_staging, RetentionPolicy, SnapshotPipeline};
use ks_core::{Config, LocalFs};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use watcher::{DispatchStats, Dispatcher, FsWatcher, IgnoreRules, CHANNEL_CAPACITY};

use crate::locks::DestinationLock;

/// Run the daemon until `shutdown` resolves or the watcher fails
pub async fn serve(config: Config, shutdown: impl Future<Output = ()>) -> Result<DispatchStats> {
    config.validate().context("Invalid configuration")?;
    config
        .prepare_destination()
        .context("Destination is not usable")?;

    let _lock = DestinationLock::acquire(&config.destination_root)?;

    let fs = LocalFs::new(config.symlinks);
    let swept = sweep_staging(
        &fs,
        &config.source_root,
        &config.destination_root,
        config.watch_depth.max_components(),
    );
    if !swept.is_empty() {
        info!(count = swept.len(), "removed interrupted snapshots");
    }

    let rules = IgnoreRules::load(&config.source_root, config.ignore.clone())
        .context("Failed to load ignore rules")?;
    let pipeline = SnapshotPipeline::new(fs, RetentionPolicy::new(config.max_versions));
    let config = Arc::new(config);
    let mut dispatcher = Dispatcher::new(Arc::clone(&config), Arc::new(pipeline), rules);

    if config.initial_snapshot {
        let count = dispatcher
            .schedule_existing()
            .context("Failed to scan source directory")?;
        info!(count, "initial snapshot scheduled");
    }

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let fs_watcher = FsWatcher::start(&config.source_root, config.watch_depth, tx)?;
    let mut dispatch = tokio::spawn(dispatcher.run(rx));

    info!(
        source = %config.source_root.display(),
        destination = %config.destination_root.display(),
        max_versions = config.max_versions,
        "keepsake running"
    );

    tokio::select! {
        _ = shutdown => {
            info!("shutdown requested");
        }
        finished = &mut dispatch => {
            drop(fs_watcher);
            return finished.context("Dispatcher task failed")?.context("Watching stopped");
        }
    }

    // Dropping the watcher closes the event channel, which drains the dispatcher
    drop(fs_watcher);
    let stats = dispatch
        .await
        .context("Dispatcher task failed")?
        .context("Watching stopped")?;
    Ok(stats)
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
