//! Per-directory debouncing
//!
//! Each watched directory is Idle, Pending (waiting for its quiet window to
//! elapse) or InProgress (a snapshot is running). Idle directories have no
//! entry in the table. The table is pure bookkeeping: the dispatcher feeds it
//! events and clock readings and acts on what it returns.
//!
//! While a snapshot is in progress, further events only set a rerun flag.
//! When the snapshot completes, a set flag starts a fresh quiet window, so a
//! burst that straddles a snapshot produces exactly one follow-up snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;

/// Observable phase of a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirPhase {
    /// Nothing scheduled
    Idle,
    /// Waiting for the quiet window to elapse
    Pending,
    /// A snapshot is running
    InProgress,
}

/// What an event did to a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    /// Idle → Pending
    Scheduled,
    /// Pending, deadline pushed back
    Rescheduled,
    /// InProgress, a follow-up snapshot was requested
    RerunRequested,
}

/// What finishing a snapshot did to a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Back to Idle
    Idle,
    /// Events arrived meanwhile; Pending again
    Rescheduled,
    /// The directory was removed while the snapshot ran
    Removed,
}

/// What a removal did to one directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// A pending snapshot was cancelled
    Cancelled,
    /// A running snapshot will finish but not be followed up
    Detached,
}

#[derive(Debug, Clone, Copy)]
enum DirState {
    Pending { deadline: Instant },
    InProgress { rerun: bool, removed: bool },
}

/// Debounce bookkeeping for every watched directory
#[derive(Debug)]
pub struct DebounceTable {
    window: Duration,
    dirs: HashMap<PathBuf, DirState>,
}

impl DebounceTable {
    /// Create a table with the given quiet window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            dirs: HashMap::new(),
        }
    }

    /// Quiet window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an event for `dir` at `now`
    pub fn touch(&mut self, dir: &Path, now: Instant) -> Touch {
        let deadline = now + self.window;
        match self.dirs.get_mut(dir) {
            None => {
                self.dirs.insert(dir.to_path_buf(), DirState::Pending { deadline });
                Touch::Scheduled
            }
            Some(DirState::Pending { deadline: d }) => {
                *d = deadline;
                Touch::Rescheduled
            }
            Some(DirState::InProgress { rerun, removed }) => {
                // A directory that came back after removal is live again
                *rerun = true;
                *removed = false;
                Touch::RerunRequested
            }
        }
    }

    /// Move every Pending directory whose deadline has passed to InProgress
    ///
    /// The caller must start exactly one snapshot per returned directory and
    /// report each back through [`complete`](Self::complete).
    pub fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut due: Vec<PathBuf> = self
            .dirs
            .iter()
            .filter_map(|(dir, state)| match state {
                DirState::Pending { deadline } if *deadline <= now => Some(dir.clone()),
                _ => None,
            })
            .collect();
        due.sort();

        for dir in &due {
            self.dirs.insert(
                dir.clone(),
                DirState::InProgress {
                    rerun: false,
                    removed: false,
                },
            );
        }
        due
    }

    /// Record that the snapshot of `dir` finished, successfully or not
    pub fn complete(&mut self, dir: &Path, now: Instant) -> Completion {
        match self.dirs.remove(dir) {
            Some(DirState::InProgress { rerun: true, .. }) => {
                self.dirs.insert(
                    dir.to_path_buf(),
                    DirState::Pending {
                        deadline: now + self.window,
                    },
                );
                Completion::Rescheduled
            }
            Some(DirState::InProgress { removed: true, .. }) => Completion::Removed,
            Some(state @ DirState::Pending { .. }) => {
                // Not ours to finish; leave the schedule alone
                self.dirs.insert(dir.to_path_buf(), state);
                Completion::Rescheduled
            }
            Some(DirState::InProgress { .. }) | None => Completion::Idle,
        }
    }

    /// Clear `dir` and everything below it
    ///
    /// Pending snapshots are cancelled. Running snapshots are left to finish
    /// and are marked so that they are not followed up.
    pub fn remove(&mut self, dir: &Path) -> Vec<(PathBuf, Removal)> {
        let mut affected = Vec::new();
        self.dirs.retain(|path, state| {
            if !path.starts_with(dir) {
                return true;
            }
            match state {
                DirState::Pending { .. } => {
                    affected.push((path.clone(), Removal::Cancelled));
                    false
                }
                DirState::InProgress { rerun, removed } => {
                    *rerun = false;
                    *removed = true;
                    affected.push((path.clone(), Removal::Detached));
                    true
                }
            }
        });
        affected.sort_by(|a, b| a.0.cmp(&b.0));
        affected
    }

    /// Drop every pending snapshot, returning the directories affected
    pub fn clear_pending(&mut self) -> Vec<PathBuf> {
        let mut cleared = Vec::new();
        self.dirs.retain(|path, state| match state {
            DirState::Pending { .. } => {
                cleared.push(path.clone());
                false
            }
            DirState::InProgress { .. } => true,
        });
        cleared.sort();
        cleared
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.dirs
            .values()
            .filter_map(|state| match state {
                DirState::Pending { deadline } => Some(*deadline),
                DirState::InProgress { .. } => None,
            })
            .min()
    }

    /// Current phase of `dir`
    pub fn phase(&self, dir: &Path) -> DirPhase {
        match self.dirs.get(dir) {
            None => DirPhase::Idle,
            Some(DirState::Pending { .. }) => DirPhase::Pending,
            Some(DirState::InProgress { .. }) => DirPhase::InProgress,
        }
    }

    /// Number of directories waiting for their window
    pub fn pending_count(&self) -> usize {
        self.dirs
            .values()
            .filter(|s| matches!(s, DirState::Pending { .. }))
            .count()
    }

    /// Number of directories with a snapshot running
    pub fn in_progress_count(&self) -> usize {
        self.dirs.len() - self.pending_count()
    }
}
