//! Snapshot pipeline: resolve → write → enforce
//!
//! One run produces exactly one new version of one directory. Runs are
//! synchronous and hold no state between calls; serializing runs for the
//! same directory is the dispatcher's job.

use std::path::PathBuf;

use ks_core::{CopyStats, FsOps, WatchedDirectory};
use tracing::{info, warn};

use crate::error::SnapshotError;
use crate::resolver::{list_versions, next_version};
use crate::retention::{RetentionEnforcer, RetentionPolicy, RetentionReport};
use crate::writer::SnapshotWriter;
use crate::Result;

/// Something that can take a snapshot of a watched directory
///
/// Implemented by [`SnapshotPipeline`]; the dispatcher only sees this trait.
pub trait SnapshotRunner: Send + Sync + 'static {
    /// Produce the next version of `dir`, blocking until done
    fn snapshot(&self, dir: &WatchedDirectory) -> Result<SnapshotOutcome>;
}

/// A successful pipeline run
#[derive(Debug)]
pub struct SnapshotOutcome {
    /// Version that was created
    pub version: u64,
    /// Where it was written
    pub path: PathBuf,
    /// Copy counters
    pub stats: CopyStats,
    /// Retention pass that followed; `None` when listing failed
    pub retention: Option<RetentionReport>,
}

/// The full per-directory pipeline over a filesystem
pub struct SnapshotPipeline<F> {
    fs: F,
    policy: RetentionPolicy,
}

impl<F: FsOps> SnapshotPipeline<F> {
    /// Create a pipeline
    pub fn new(fs: F, policy: RetentionPolicy) -> Self {
        Self { fs, policy }
    }

    /// Filesystem in use
    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Retention policy in use
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Run the pipeline once for `dir`
    ///
    /// Logs the created snapshot and each removed version; the returned
    /// error is left for the caller to log.
    pub fn run(&self, dir: &WatchedDirectory) -> Result<SnapshotOutcome> {
        if !self.fs.exists(dir.source()) {
            return Err(SnapshotError::SourceMissing {
                path: dir.source().to_path_buf(),
            });
        }

        // Never assume the mirrored parent is there
        let parent = dir.destination_parent();
        self.fs
            .create_dir_all(parent)
            .map_err(|source| SnapshotError::StorageUnavailable {
                path: parent.to_path_buf(),
                source,
            })?;

        let versions = list_versions(&self.fs, parent, dir.base_name())?;
        let version = next_version(&versions)?;
        let dest = dir.version_path(version);

        let written = match SnapshotWriter::new(&self.fs).write_snapshot(dir.source(), &dest) {
            Ok(written) => written,
            Err(err) => {
                if let SnapshotError::CopyFailure { partial, .. } = &err {
                    self.discard_partial(dir, partial);
                }
                return Err(err);
            }
        };

        info!(
            dir = %dir,
            version,
            path = %written.path.display(),
            files = written.stats.files,
            bytes = written.stats.bytes,
            "snapshot created"
        );

        let enforcer = RetentionEnforcer::new(&self.fs, self.policy);
        let retention = match enforcer.enforce(parent, dir.base_name()) {
            Ok(report) => Some(report),
            Err(err) => {
                // The snapshot itself is complete; the next run retries the trim
                warn!(dir = %dir, error = %err, "retention pass skipped");
                None
            }
        };

        Ok(SnapshotOutcome {
            version,
            path: written.path,
            stats: written.stats,
            retention,
        })
    }

    fn discard_partial(&self, dir: &WatchedDirectory, partial: &std::path::Path) {
        if let Err(err) = self.fs.remove_tree(partial) {
            warn!(
                dir = %dir,
                path = %partial.display(),
                error = %err,
                "failed to remove partial snapshot"
            );
        }
    }
}

impl<F: FsOps + 'static> SnapshotRunner for SnapshotPipeline<F> {
    fn snapshot(&self, dir: &WatchedDirectory) -> Result<SnapshotOutcome> {
        self.run(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_core::naming::is_staging_name;
    use ks_core::{Config, CoreError, LocalFs};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let source_root = temp_dir.path().join("source");
            let destination_root = temp_dir.path().join("backups");
            fs::create_dir_all(&source_root).unwrap();
            fs::create_dir_all(&destination_root).unwrap();
            Self {
                config: Config {
                    source_root,
                    destination_root,
                    ..Config::default()
                },
                _temp_dir: temp_dir,
            }
        }

        fn dir(&self, relative: &str) -> WatchedDirectory {
            let dir = self.config.watched_directory(relative).unwrap();
            fs::create_dir_all(dir.source()).unwrap();
            dir
        }

        fn versions(&self, dir: &WatchedDirectory) -> Vec<u64> {
            list_versions(&LocalFs::default(), dir.destination_parent(), dir.base_name())
                .map(|vs| vs.iter().map(|v| v.version).collect())
                .unwrap_or_default()
        }
    }

    #[test]
    fn test_first_and_second_snapshot() {
        let fixture = Fixture::new();
        let dir = fixture.dir("reports");
        fs::write(dir.source().join("a.txt"), b"one").unwrap();
        let pipeline = SnapshotPipeline::new(LocalFs::default(), RetentionPolicy::new(4));

        let first = pipeline.run(&dir).unwrap();
        fs::write(dir.source().join("a.txt"), b"two").unwrap();
        let second = pipeline.run(&dir).unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(fs::read(first.path.join("a.txt")).unwrap(), b"one");
        assert_eq!(fs::read(second.path.join("a.txt")).unwrap(), b"two");
        assert_eq!(fixture.versions(&dir), vec![2, 1]);
    }

    #[test]
    fn test_five_snapshots_keep_four() {
        let fixture = Fixture::new();
        let dir = fixture.dir("reports");
        let pipeline = SnapshotPipeline::new(LocalFs::default(), RetentionPolicy::new(4));

        for _ in 0..5 {
            pipeline.run(&dir).unwrap();
        }

        assert_eq!(fixture.versions(&dir), vec![5, 4, 3, 2]);
    }

    #[test]
    fn test_nested_directory_creates_mirrored_parent() {
        let fixture = Fixture::new();
        let dir = fixture.dir("team/reports");
        fs::write(dir.source().join("q.txt"), b"q").unwrap();
        let pipeline = SnapshotPipeline::new(LocalFs::default(), RetentionPolicy::new(8));

        let outcome = pipeline.run(&dir).unwrap();

        assert_eq!(outcome.path, fixture.config.destination_root.join("team/reports_v1"));
        assert!(outcome.path.join("q.txt").exists());
    }

    #[test]
    fn test_missing_source_creates_nothing() {
        let fixture = Fixture::new();
        let dir = fixture.config.watched_directory("ghost").unwrap();
        let pipeline = SnapshotPipeline::new(LocalFs::default(), RetentionPolicy::default());

        let err = pipeline.run(&dir).unwrap_err();

        assert!(matches!(err, SnapshotError::SourceMissing { .. }));
        assert!(fixture.versions(&dir).is_empty());
    }

    #[test]
    fn test_versions_continue_after_external_cleanup() {
        let fixture = Fixture::new();
        let dir = fixture.dir("reports");
        let pipeline = SnapshotPipeline::new(LocalFs::default(), RetentionPolicy::new(4));

        pipeline.run(&dir).unwrap();
        pipeline.run(&dir).unwrap();
        fs::remove_dir_all(dir.version_path(1)).unwrap();

        let outcome = pipeline.run(&dir).unwrap();
        assert_eq!(outcome.version, 3);
    }

    /// Fails every copy after writing part of it
    struct BrokenCopyFs {
        inner: LocalFs,
    }

    impl FsOps for BrokenCopyFs {
        fn list_entries(&self, dir: &Path) -> ks_core::Result<Vec<String>> {
            self.inner.list_entries(dir)
        }

        fn copy_tree(&self, _src: &Path, dst: &Path) -> ks_core::Result<CopyStats> {
            fs::create_dir_all(dst).unwrap();
            fs::write(dst.join("half.txt"), b"half").unwrap();
            Err(CoreError::Io {
                operation: "copy_tree.copy_file",
                path: dst.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "device gone"),
            })
        }

        fn remove_tree(&self, path: &Path) -> ks_core::Result<()> {
            self.inner.remove_tree(path)
        }

        fn create_dir_all(&self, path: &Path) -> ks_core::Result<()> {
            self.inner.create_dir_all(path)
        }

        fn rename(&self, from: &Path, to: &Path) -> ks_core::Result<()> {
            self.inner.rename(from, to)
        }

        fn exists(&self, path: &Path) -> bool {
            self.inner.exists(path)
        }
    }

    #[test]
    fn test_copy_failure_leaves_no_trace() {
        let fixture = Fixture::new();
        let dir = fixture.dir("reports");
        let pipeline = SnapshotPipeline::new(
            BrokenCopyFs {
                inner: LocalFs::default(),
            },
            RetentionPolicy::default(),
        );

        let err = pipeline.run(&dir).unwrap_err();

        assert!(matches!(err, SnapshotError::CopyFailure { .. }));
        let leftovers: Vec<_> = fs::read_dir(&fixture.config.destination_root)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| is_staging_name(name) || name.starts_with("reports"))
            .collect();
        assert!(leftovers.is_empty(), "unexpected entries: {leftovers:?}");
    }
}
