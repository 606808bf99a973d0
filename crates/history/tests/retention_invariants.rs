//! End-to-end checks of the snapshot pipeline against a real directory tree

use std::fs;
use std::path::Path;

use history::{list_versions, SnapshotPipeline, RetentionPolicy};
use ks_core::{Config, LocalFs, WatchedDirectory};
use tempfile::TempDir;

fn setup(temp_dir: &TempDir) -> Config {
    let config = Config {
        source_root: temp_dir.path().join("source"),
        destination_root: temp_dir.path().join("backups"),
        ..Config::default()
    };
    fs::create_dir_all(&config.source_root).unwrap();
    fs::create_dir_all(&config.destination_root).unwrap();
    config
}

fn watched(config: &Config, relative: &str) -> WatchedDirectory {
    let dir = config.watched_directory(relative).unwrap();
    fs::create_dir_all(dir.source()).unwrap();
    fs::write(dir.source().join("data.txt"), relative).unwrap();
    dir
}

fn versions(dir: &WatchedDirectory) -> Vec<u64> {
    list_versions(&LocalFs::default(), dir.destination_parent(), dir.base_name())
        .unwrap()
        .into_iter()
        .map(|v| v.version)
        .collect()
}

#[test]
fn test_cap_holds_after_every_run() {
    for cap in 1..=5usize {
        let temp_dir = TempDir::new().unwrap();
        let config = setup(&temp_dir);
        let dir = watched(&config, "reports");
        let pipeline = SnapshotPipeline::new(LocalFs::default(), RetentionPolicy::new(cap));

        for run in 1..=8u64 {
            let outcome = pipeline.run(&dir).unwrap();
            assert_eq!(outcome.version, run, "versions must be consecutive and never reused");

            let on_disk = versions(&dir);
            assert!(on_disk.len() <= cap);

            // The newest `cap` versions survive, nothing older
            let expected: Vec<u64> = (1..=run).rev().take(cap).collect();
            assert_eq!(on_disk, expected, "cap {cap}, run {run}");
        }
    }
}

#[test]
fn test_directories_are_independent() {
    let temp_dir = TempDir::new().unwrap();
    let config = setup(&temp_dir);
    let reports = watched(&config, "reports");
    let invoices = watched(&config, "invoices");
    let pipeline = SnapshotPipeline::new(LocalFs::default(), RetentionPolicy::new(2));

    for _ in 0..3 {
        pipeline.run(&reports).unwrap();
    }
    pipeline.run(&invoices).unwrap();

    assert_eq!(versions(&reports), vec![3, 2]);
    assert_eq!(versions(&invoices), vec![1]);
    assert_eq!(
        fs::read_to_string(invoices.version_path(1).join("data.txt")).unwrap(),
        "invoices"
    );
}

#[test]
fn test_foreign_entries_survive_retention() {
    let temp_dir = TempDir::new().unwrap();
    let config = setup(&temp_dir);
    let dir = watched(&config, "reports");
    let backups = &config.destination_root;
    fs::create_dir(backups.join("reports_old")).unwrap();
    fs::create_dir(backups.join("reports_v01")).unwrap();
    fs::write(backups.join("reports_v2.tar"), b"").unwrap();
    let pipeline = SnapshotPipeline::new(LocalFs::default(), RetentionPolicy::new(1));

    pipeline.run(&dir).unwrap();
    pipeline.run(&dir).unwrap();

    assert_eq!(versions(&dir), vec![2]);
    for foreign in ["reports_old", "reports_v01", "reports_v2.tar"] {
        assert!(backups.join(foreign).exists(), "{foreign} was removed");
    }
}

#[test]
fn test_resumes_numbering_from_existing_tree() {
    let temp_dir = TempDir::new().unwrap();
    let config = setup(&temp_dir);
    let dir = watched(&config, "team/reports");
    let parent = config.destination_root.join("team");
    for v in [9, 10] {
        fs::create_dir_all(parent.join(format!("reports_v{v}"))).unwrap();
    }
    let pipeline = SnapshotPipeline::new(LocalFs::default(), RetentionPolicy::new(4));

    let outcome = pipeline.run(&dir).unwrap();

    assert_eq!(outcome.version, 11);
    assert_eq!(outcome.path, parent.join("reports_v11"));
    assert!(Path::new(&outcome.path).join("data.txt").exists());
}
