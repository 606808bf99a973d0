//! Platform file watching
//!
//! Wraps notify's recommended backend (inotify, FSEvents, ReadDirectoryChangesW)
//! and translates its events into [`WatchEvent`]s. Events are handed to the
//! async side through a bounded channel; when the dispatcher falls behind the
//! notify thread blocks rather than dropping events.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ks_core::WatchDepth;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{ErrorKind, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::WatchEvent;

/// A running platform watcher
///
/// Watching stops when this is dropped.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FsWatcher {
    /// Start watching `source_root`, sending events to `tx`
    ///
    /// Top-level watching only subscribes to the root itself; nested watching
    /// subscribes recursively and leaves depth filtering to the dispatcher.
    pub fn start(
        source_root: &Path,
        depth: WatchDepth,
        tx: mpsc::Sender<WatchEvent>,
    ) -> Result<Self> {
        let root = source_root.to_path_buf();
        let handler_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let events = match res {
                Ok(event) => translate(&handler_root, event),
                Err(err) => vec![translate_error(err)],
            };
            for event in events {
                // Receiver gone means the dispatcher is shutting down
                if tx.blocking_send(event).is_err() {
                    break;
                }
            }
        })
        .context("failed to create filesystem watcher")?;

        let mode = match depth {
            WatchDepth::TopLevel => RecursiveMode::NonRecursive,
            WatchDepth::Nested => RecursiveMode::Recursive,
        };
        watcher
            .watch(&root, mode)
            .with_context(|| format!("failed to watch {}", root.display()))?;

        info!(root = %root.display(), depth = %depth, "watching for changes");
        Ok(Self {
            _watcher: watcher,
            root,
        })
    }

    /// Watched root
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Translate one notify event
///
/// A path that disappeared without saying what it was yields both a removal
/// and a change: the removal clears its state if it was a directory, the
/// change snapshots its parent either way.
pub fn translate(root: &Path, event: Event) -> Vec<WatchEvent> {
    if event.need_rescan() {
        return vec![WatchEvent::Overflow];
    }

    let mut out = Vec::new();

    if event.paths.iter().any(|p| p == root) && removes_path(&event.kind) {
        out.push(WatchEvent::WatchError {
            reason: format!("source root {} was removed", root.display()),
            fatal: true,
        });
        return out;
    }

    let paths = event.paths.into_iter().filter(|p| p != root);

    match event.kind {
        EventKind::Create(CreateKind::Folder) => out.extend(paths.map(WatchEvent::DirectoryAdded)),
        EventKind::Create(CreateKind::File) => out.extend(paths.map(WatchEvent::FileChanged)),
        EventKind::Create(_) => paths.for_each(|p| appeared(&mut out, p)),

        EventKind::Modify(ModifyKind::Metadata(_)) => {}
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.for_each(|p| vanished(&mut out, p))
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.for_each(|p| appeared(&mut out, p))
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // Paths are [from, to]
            for (i, p) in paths.enumerate() {
                if i == 0 {
                    vanished(&mut out, p);
                } else {
                    appeared(&mut out, p);
                }
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths.for_each(|p| {
            if p.exists() {
                appeared(&mut out, p)
            } else {
                vanished(&mut out, p)
            }
        }),
        EventKind::Modify(_) | EventKind::Any => paths.for_each(|p| {
            if !p.exists() {
                vanished(&mut out, p)
            } else if !p.is_dir() {
                out.push(WatchEvent::FileChanged(p))
            }
        }),

        EventKind::Remove(RemoveKind::Folder) => {
            out.extend(paths.map(WatchEvent::DirectoryRemoved))
        }
        EventKind::Remove(RemoveKind::File) => out.extend(paths.map(WatchEvent::FileChanged)),
        EventKind::Remove(_) => paths.for_each(|p| vanished(&mut out, p)),

        EventKind::Access(_) | EventKind::Other => {}
    }

    if out.is_empty() {
        debug!(kind = ?event.kind, "dropped event");
    }
    out
}

/// Translate a notify error; running out of watch handles is fatal
pub fn translate_error(err: notify::Error) -> WatchEvent {
    let fatal = matches!(err.kind, ErrorKind::MaxFilesWatch);
    WatchEvent::WatchError {
        reason: err.to_string(),
        fatal,
    }
}

fn removes_path(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From))
    )
}

fn appeared(out: &mut Vec<WatchEvent>, path: PathBuf) {
    if path.is_dir() {
        out.push(WatchEvent::DirectoryAdded(path));
    } else {
        out.push(WatchEvent::FileChanged(path));
    }
}

fn vanished(out: &mut Vec<WatchEvent>, path: PathBuf) {
    out.push(WatchEvent::DirectoryRemoved(path.clone()));
    out.push(WatchEvent::FileChanged(path));
}
