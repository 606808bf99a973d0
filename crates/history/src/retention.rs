//! Retention policy and enforcement

use std::path::Path;

use ks_core::config::DEFAULT_MAX_VERSIONS;
use ks_core::{FsOps, VersionedSnapshot};
use tracing::{info, warn};

use crate::error::SnapshotError;
use crate::resolver::list_versions;
use crate::Result;

/// Retention policy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Number of versions to keep per directory (default: 4, never below 1)
    pub max_versions: usize,
}

impl RetentionPolicy {
    /// Keep `max_versions` versions; zero is raised to one so the newest
    /// snapshot always survives
    pub fn new(max_versions: usize) -> Self {
        Self {
            max_versions: max_versions.max(1),
        }
    }

    /// Versions beyond the cap, given a newest-first list
    pub fn stale<'v>(&self, versions: &'v [VersionedSnapshot]) -> &'v [VersionedSnapshot] {
        versions.get(self.max_versions..).unwrap_or(&[])
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VERSIONS)
    }
}

/// Result of one enforcement pass
#[derive(Debug, Default)]
pub struct RetentionReport {
    /// Versions still on disk after the pass, newest first
    pub kept: Vec<u64>,
    /// Versions removed, newest first
    pub deleted: Vec<u64>,
    /// Versions that should have been removed but could not be
    pub failures: Vec<SnapshotError>,
}

impl RetentionReport {
    /// True when nothing had to be removed
    pub fn is_noop(&self) -> bool {
        self.deleted.is_empty() && self.failures.is_empty()
    }
}

/// Deletes the oldest versions of a directory beyond the policy cap
pub struct RetentionEnforcer<'a> {
    fs: &'a dyn FsOps,
    policy: RetentionPolicy,
}

impl<'a> RetentionEnforcer<'a> {
    /// Create an enforcer with the given policy
    pub fn new(fs: &'a dyn FsOps, policy: RetentionPolicy) -> Self {
        Self { fs, policy }
    }

    /// Policy in effect
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Trim `base_name` under `destination_parent` down to the cap
    ///
    /// Removal is best effort: a version that cannot be deleted is reported
    /// and the remaining stale versions are still attempted. Only a failure
    /// to list the versions is returned as an error.
    pub fn enforce(&self, destination_parent: &Path, base_name: &str) -> Result<RetentionReport> {
        let versions = list_versions(self.fs, destination_parent, base_name)?;
        let stale = self.policy.stale(&versions);

        let mut report = RetentionReport {
            kept: versions
                .iter()
                .take(self.policy.max_versions)
                .map(|v| v.version)
                .collect(),
            ..RetentionReport::default()
        };

        for snapshot in stale {
            match self.fs.remove_tree(&snapshot.path) {
                Ok(()) => {
                    info!(
                        dir = base_name,
                        version = snapshot.version,
                        path = %snapshot.path.display(),
                        "removed old version"
                    );
                    report.deleted.push(snapshot.version);
                }
                Err(source) => {
                    let err = SnapshotError::DeleteFailure {
                        version: snapshot.version,
                        path: snapshot.path.clone(),
                        source,
                    };
                    warn!(
                        dir = base_name,
                        version = snapshot.version,
                        error = %err,
                        "failed to remove old version"
                    );
                    report.failures.push(err);
                }
            }
        }

        Ok(report)
    }
}
