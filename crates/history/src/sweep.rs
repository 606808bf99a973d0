//! Cleanup of staging directories left by an interrupted copy
//!
//! Staging directories only ever sit in a destination parent, so the walk is
//! bounded by the watch depth and never looks inside finished snapshots. A
//! version-named directory is only entered when it mirrors a source directory
//! of the same name.

use std::path::{Path, PathBuf};

use ks_core::naming::{is_staging_name, parse_version, VERSION_DELIMITER};
use ks_core::FsOps;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Remove every staging directory under `destination_root`
///
/// `max_depth` is the number of levels watched directories can sit below
/// `source_root`. Returns the paths that were removed.
pub fn sweep_staging(
    fs: &dyn FsOps,
    source_root: &Path,
    destination_root: &Path,
    max_depth: usize,
) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    let mut walker = WalkDir::new(destination_root)
        .follow_links(false)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "staging sweep could not read entry");
                continue;
            }
        };
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };

        if is_staging_name(name) {
            match fs.remove_tree(entry.path()) {
                Ok(()) => {
                    info!(path = %entry.path().display(), "removed interrupted snapshot");
                    removed.push(entry.path().to_path_buf());
                }
                Err(err) => warn!(
                    path = %entry.path().display(),
                    error = %err,
                    "failed to remove interrupted snapshot"
                ),
            }
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
        } else if entry.file_type().is_dir()
            && looks_like_version(name)
            && !mirrors_source(source_root, destination_root, entry.path())
        {
            // Finished snapshot: user content, not ours to touch
            walker.skip_current_dir();
        }
    }

    removed
}

/// Whether `path` is the destination parent of a source directory
fn mirrors_source(source_root: &Path, destination_root: &Path, path: &Path) -> bool {
    path.strip_prefix(destination_root)
        .map(|relative| source_root.join(relative).is_dir())
        .unwrap_or(false)
}

fn looks_like_version(name: &str) -> bool {
    name.rsplit_once(VERSION_DELIMITER)
        .map(|(base, _)| parse_version(name, base).is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_core::LocalFs;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_sweep_removes_staging_only() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let root = &temp_dir.path().join("backups");
        fs::create_dir_all(root.join("reports_v1")).unwrap();
        fs::create_dir_all(root.join(".reports_v2.partial-0a1b2c").join("sub")).unwrap();
        fs::create_dir_all(root.join("team/.notes_v4.partial-ffee")).unwrap();
        fs::create_dir_all(root.join("team/notes_v3")).unwrap();

        let removed = sweep_staging(&LocalFs::default(), &source, root, 2);

        assert_eq!(removed.len(), 2);
        assert!(root.join("reports_v1").exists());
        assert!(root.join("team/notes_v3").exists());
        assert!(!root.join(".reports_v2.partial-0a1b2c").exists());
        assert!(!root.join("team/.notes_v4.partial-ffee").exists());
    }

    #[test]
    fn test_sweep_never_enters_snapshots() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let root = &temp_dir.path().join("backups");
        // A snapshot of a directory that itself contains a staging-like name
        let inside = root.join("reports_v1/.data_v1.partial-abc");
        fs::create_dir_all(&inside).unwrap();

        let removed = sweep_staging(&LocalFs::default(), &source, root, 2);

        assert!(removed.is_empty());
        assert!(inside.exists());
    }

    #[test]
    fn test_sweep_respects_depth() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let root = &temp_dir.path().join("backups");
        let deep = root.join("team/.notes_v1.partial-abc");
        fs::create_dir_all(&deep).unwrap();

        let removed = sweep_staging(&LocalFs::default(), &source, root, 1);

        assert!(removed.is_empty());
        assert!(deep.exists());
    }

    #[test]
    fn test_sweep_enters_parent_named_like_a_version() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let root = &temp_dir.path().join("backups");
        // Source directory `data_v2` has a nested watched directory `x`
        fs::create_dir_all(source.join("data_v2/x")).unwrap();
        let staging = root.join("data_v2/.x_v1.partial-abc");
        fs::create_dir_all(&staging).unwrap();
        fs::create_dir_all(root.join("data_v2/x_v1")).unwrap();

        let removed = sweep_staging(&LocalFs::default(), &source, root, 2);

        assert_eq!(removed, vec![staging.clone()]);
        assert!(!staging.exists());
        assert!(root.join("data_v2/x_v1").exists());
    }

    #[test]
    fn test_sweep_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");
        let removed = sweep_staging(&LocalFs::default(), temp_dir.path(), &missing, 2);
        assert!(removed.is_empty());
    }
}
