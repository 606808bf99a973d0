//! Event dispatcher
//!
//! Maps normalized events to watched directories, debounces them, and runs
//! at most one snapshot per directory at a time. Snapshots of different
//! directories run concurrently on the blocking pool.
//!
//! Shutdown is driven by the event channel: once every sender is dropped,
//! pending snapshots are discarded and running ones are awaited.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use history::{SnapshotOutcome, SnapshotRunner};
use ks_core::{Config, WatchDepth, WatchedDirectory};
use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::debounce::{Completion, DebounceTable, DirPhase, Removal, Touch};
use crate::error::{DispatchError, RunFailure};
use crate::ignore::IgnoreRules;
use crate::scan::watched_directories;
use crate::WatchEvent;

/// Counters reported when the dispatcher stops
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events received
    pub events: u64,
    /// Events that mapped to no watched directory
    pub ignored: u64,
    /// Events absorbed by a pending or running snapshot
    pub coalesced: u64,
    /// Snapshots created
    pub snapshots: u64,
    /// Snapshot runs that failed
    pub failures: u64,
    /// Pending snapshots dropped at shutdown
    pub discarded: u64,
}

/// Where an event leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Route {
    /// Debounce a snapshot of this directory
    Snapshot(PathBuf),
    /// Forget this directory and everything below it
    Clear(PathBuf),
    /// The ignore file changed
    ReloadIgnore,
    /// Nothing to do
    Drop,
}

struct TaskReport {
    dir: WatchedDirectory,
    result: Result<SnapshotOutcome, RunFailure>,
}

/// Turns watch events into snapshot runs
pub struct Dispatcher<R> {
    config: Arc<Config>,
    canonical_root: Option<PathBuf>,
    runner: Arc<R>,
    rules: IgnoreRules,
    table: DebounceTable,
    tasks: JoinSet<TaskReport>,
    running: HashMap<task::Id, PathBuf>,
    stats: DispatchStats,
}

impl<R: SnapshotRunner> Dispatcher<R> {
    /// Create a dispatcher for `config`
    pub fn new(config: Arc<Config>, runner: Arc<R>, rules: IgnoreRules) -> Self {
        // Some platforms report resolved paths (e.g. /private/var on macOS)
        let canonical_root = config
            .source_root
            .canonicalize()
            .ok()
            .filter(|c| *c != config.source_root);

        Self {
            table: DebounceTable::new(config.debounce_window()),
            config,
            canonical_root,
            runner,
            rules,
            tasks: JoinSet::new(),
            running: HashMap::new(),
            stats: DispatchStats::default(),
        }
    }

    /// Counters so far
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Current phase of the directory at `relative`
    pub fn phase(&self, relative: &Path) -> DirPhase {
        self.table.phase(relative)
    }

    /// Schedule a snapshot of every directory currently in the source root
    ///
    /// Returns how many directories were scheduled.
    pub fn schedule_existing(&mut self) -> anyhow::Result<usize> {
        let dirs = watched_directories(
            &self.config.source_root,
            self.config.watch_depth,
            &self.rules,
        )?;
        let count = dirs.len();
        for dir in dirs {
            if let Some(relative) = self.relative(&dir) {
                self.schedule(relative);
            }
        }
        Ok(count)
    }

    /// Process events until the channel closes or the watcher fails
    ///
    /// Returns the final counters. A fatal watcher error is returned after
    /// running snapshots have finished.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<WatchEvent>,
    ) -> Result<DispatchStats, DispatchError> {
        info!(
            root = %self.config.source_root.display(),
            depth = %self.config.watch_depth,
            debounce_ms = self.config.debounce_ms,
            "dispatcher started"
        );

        let mut failure = None;
        loop {
            let wake = self.table.next_deadline();

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(err) = self.handle_event(event) {
                            failure = Some(err);
                            break;
                        }
                    }
                    None => {
                        debug!("event stream closed");
                        break;
                    }
                },
                Some(joined) = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => {
                    self.finish(joined);
                }
                _ = sleep_until(wake.unwrap_or_else(far_future)), if wake.is_some() => {
                    self.start_due();
                }
            }
        }

        events.close();
        self.shutdown().await;

        match failure {
            Some(err) => Err(err),
            None => Ok(self.stats),
        }
    }

    fn handle_event(&mut self, event: WatchEvent) -> Result<(), DispatchError> {
        self.stats.events += 1;

        match event {
            WatchEvent::WatchError { reason, fatal: true } => {
                error!(%reason, "watcher failed");
                return Err(DispatchError::Watcher { reason });
            }
            WatchEvent::WatchError { reason, fatal: false } => {
                warn!(%reason, "watcher reported an error");
            }
            WatchEvent::Overflow => {
                warn!("watcher dropped events; rescanning watched directories");
                if let Err(err) = self.schedule_existing() {
                    warn!(error = %err, "rescan failed");
                }
            }
            event => match self.route(&event) {
                Route::Snapshot(dir) => self.schedule(dir),
                Route::Clear(dir) => self.clear(&dir),
                Route::ReloadIgnore => self.reload_ignore(),
                Route::Drop => {
                    self.stats.ignored += 1;
                    trace!(?event, "event ignored");
                }
            },
        }

        Ok(())
    }

    /// Map an event to the directory it concerns
    ///
    /// A directory event targets that directory, a file event targets its
    /// parent. Paths deeper than the watch depth, paths resolving to the root
    /// and ignored paths lead nowhere.
    pub(crate) fn route(&self, event: &WatchEvent) -> Route {
        let (path, targets_parent) = match event {
            WatchEvent::DirectoryAdded(p) => (p, false),
            WatchEvent::FileChanged(p) => (p, true),
            WatchEvent::DirectoryRemoved(p) => {
                return self.relative(p).map(Route::Clear).unwrap_or(Route::Drop);
            }
            WatchEvent::Overflow | WatchEvent::WatchError { .. } => return Route::Drop,
        };

        let Some(relative) = self.relative(path) else {
            return Route::Drop;
        };
        if self.rules.is_ignore_file(&relative) {
            return Route::ReloadIgnore;
        }
        if relative.components().count() > self.config.watch_depth.max_components()
            || self.rules.should_ignore(&relative)
        {
            return Route::Drop;
        }

        let target = if targets_parent {
            relative.parent().map(Path::to_path_buf).unwrap_or_default()
        } else {
            relative
        };
        if target.as_os_str().is_empty() {
            Route::Drop
        } else {
            Route::Snapshot(target)
        }
    }

    /// Path relative to the source root, or `None` when outside it
    fn relative(&self, path: &Path) -> Option<PathBuf> {
        if path.starts_with(&self.config.destination_root) {
            return None;
        }
        let relative = path
            .strip_prefix(&self.config.source_root)
            .ok()
            .or_else(|| {
                self.canonical_root
                    .as_deref()
                    .and_then(|root| path.strip_prefix(root).ok())
            })?;

        let normal = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if relative.as_os_str().is_empty() || !normal {
            return None;
        }
        Some(relative.to_path_buf())
    }

    fn schedule(&mut self, dir: PathBuf) {
        match self.table.touch(&dir, Instant::now()) {
            Touch::Scheduled => debug!(dir = %dir.display(), "snapshot scheduled"),
            Touch::Rescheduled => {
                self.stats.coalesced += 1;
                trace!(dir = %dir.display(), "quiet window restarted");
            }
            Touch::RerunRequested => {
                self.stats.coalesced += 1;
                debug!(dir = %dir.display(), "snapshot running; follow-up requested");
            }
        }
    }

    fn clear(&mut self, dir: &Path) {
        for (path, removal) in self.table.remove(dir) {
            match removal {
                Removal::Cancelled => {
                    info!(dir = %path.display(), "directory removed; pending snapshot cancelled")
                }
                Removal::Detached => {
                    info!(dir = %path.display(), "directory removed while its snapshot runs")
                }
            }
        }
    }

    fn reload_ignore(&mut self) {
        match self.rules.reload_ignore_file() {
            Ok(()) => info!(sources = self.rules.active_sources(), "ignore rules reloaded"),
            Err(err) => {
                warn!(error = %err, "failed to reload ignore rules; keeping previous rules")
            }
        }
    }

    fn start_due(&mut self) {
        let now = Instant::now();
        for relative in self.table.take_due(now) {
            let dir = match self.config.watched_directory(&relative) {
                Ok(dir) => dir,
                Err(err) => {
                    warn!(dir = %relative.display(), error = %err, "cannot snapshot directory");
                    self.table.complete(&relative, now);
                    continue;
                }
            };

            debug!(dir = %dir, "snapshot started");
            let runner = Arc::clone(&self.runner);
            let handle = self.tasks.spawn_blocking(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| runner.snapshot(&dir)))
                    .map_err(|payload| RunFailure::Panicked(panic_message(payload.as_ref())))
                    .and_then(|result| result.map_err(RunFailure::from));
                TaskReport { dir, result }
            });
            self.running.insert(handle.id(), relative);
        }
    }

    fn finish(&mut self, joined: Result<(task::Id, TaskReport), JoinError>) {
        let report = match joined {
            Ok((id, report)) => {
                self.running.remove(&id);
                report
            }
            Err(err) => {
                self.stats.failures += 1;
                match self.running.remove(&err.id()) {
                    Some(relative) => {
                        error!(dir = %relative.display(), error = %err, "snapshot task lost");
                        self.table.complete(&relative, Instant::now());
                    }
                    None => error!(error = %err, "snapshot task lost"),
                }
                return;
            }
        };

        let completion = self.table.complete(report.dir.relative(), Instant::now());
        match &report.result {
            Ok(outcome) => {
                self.stats.snapshots += 1;
                debug!(dir = %report.dir, version = outcome.version, "snapshot finished");
            }
            Err(err) => {
                self.stats.failures += 1;
                error!(dir = %report.dir, error = %err, "snapshot failed");
            }
        }

        match completion {
            Completion::Idle => {}
            Completion::Rescheduled => {
                debug!(dir = %report.dir, "changes arrived during snapshot; follow-up scheduled")
            }
            Completion::Removed => {
                info!(dir = %report.dir, "directory was removed during its snapshot; not retried")
            }
        }
    }

    async fn shutdown(&mut self) {
        let discarded = self.table.clear_pending();
        if !discarded.is_empty() {
            info!(count = discarded.len(), "discarding pending snapshots");
            self.stats.discarded += discarded.len() as u64;
        }

        if !self.tasks.is_empty() {
            info!(count = self.tasks.len(), "waiting for running snapshots");
        }
        while let Some(joined) = self.tasks.join_next_with_id().await {
            self.finish(joined);
        }

        // Follow-ups requested by the runs that just finished
        let late = self.table.clear_pending();
        self.stats.discarded += late.len() as u64;

        info!(
            snapshots = self.stats.snapshots,
            failures = self.stats.failures,
            discarded = self.stats.discarded,
            "dispatcher stopped"
        );
    }
}

impl<R> Dispatcher<R> {
    /// Watch depth in effect
    pub fn watch_depth(&self) -> WatchDepth {
        self.config.watch_depth
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
