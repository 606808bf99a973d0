//! Real filesystem events through the real pipeline

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use history::{list_versions, RetentionPolicy, SnapshotPipeline};
use ks_core::{Config, LocalFs, WatchDepth};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use watcher::{Dispatcher, FsWatcher, IgnoreRules, CHANNEL_CAPACITY};

const SETTLE: Duration = Duration::from_secs(5);

async fn wait_for(mut cond: impl FnMut() -> bool, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(25)).await;
    }
    cond()
}

fn versions(parent: &Path, base: &str) -> Vec<u64> {
    list_versions(&LocalFs::default(), parent, base)
        .map(|vs| vs.iter().map(|v| v.version).collect())
        .unwrap_or_default()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let source_root = temp_dir.path().join("source");
    let destination_root = temp_dir.path().join("backups");
    fs::create_dir_all(&source_root).unwrap();
    fs::create_dir_all(&destination_root).unwrap();

    let config = Config {
        source_root: source_root.clone(),
        destination_root: destination_root.clone(),
        max_versions: 2,
        debounce_ms: 200,
        watch_depth: WatchDepth::Nested,
        ..Config::default()
    };
    config.validate().unwrap();

    let policy = RetentionPolicy::new(config.max_versions);
    let pipeline = SnapshotPipeline::new(LocalFs::default(), policy);
    let rules = IgnoreRules::load(&source_root, config.ignore.clone()).unwrap();
    let dispatcher = Dispatcher::new(Arc::new(config), Arc::new(pipeline), rules);

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let fs_watcher = FsWatcher::start(&source_root, WatchDepth::Nested, tx).unwrap();
    let handle = tokio::spawn(dispatcher.run(rx));
    sleep(Duration::from_millis(100)).await;

    // New directory → first version
    fs::create_dir(source_root.join("reports")).unwrap();
    fs::write(source_root.join("reports/summary.txt"), b"one").unwrap();
    assert!(wait_for(|| versions(&destination_root, "reports") == vec![1], SETTLE).await);
    sleep(Duration::from_millis(400)).await;

    // Edits after settling → next version with the new content
    fs::write(source_root.join("reports/summary.txt"), b"two").unwrap();
    assert!(wait_for(|| versions(&destination_root, "reports") == vec![2, 1], SETTLE).await);
    assert_eq!(
        fs::read(destination_root.join("reports_v2/summary.txt")).unwrap(),
        b"two"
    );
    sleep(Duration::from_millis(400)).await;

    // Cap of two drops the oldest
    fs::write(source_root.join("reports/summary.txt"), b"three").unwrap();
    assert!(wait_for(|| versions(&destination_root, "reports") == vec![3, 2], SETTLE).await);

    // Editor temporaries alone never snapshot
    fs::write(source_root.join("reports/.summary.txt.swp"), b"swap").unwrap();
    sleep(Duration::from_millis(800)).await;
    assert_eq!(versions(&destination_root, "reports"), vec![3, 2]);

    drop(fs_watcher);
    let stats = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(stats.snapshots, 3);
    assert_eq!(stats.failures, 0);
}
