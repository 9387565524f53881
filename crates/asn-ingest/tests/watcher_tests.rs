//! Inbox watcher tests against a real directory and SQLite file

#![allow(clippy::unwrap_used, clippy::expect_used)]

use asn_ingest::config::{Config, DatabaseConfig, FolderConfig, WatchConfig};
use asn_ingest::db;
use asn_ingest::watch::{InboxWatcher, WatchSummary};
use asn_ingest::IngestPipeline;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const MANIFEST: &str = "HDR TRSP117 6874453I\nLINE P000001661 9781473663800 12\n";

async fn setup(root: &TempDir, archive_duplicates: bool) -> (Config, IngestPipeline) {
    setup_with(root, |watch| watch.archive_duplicates = archive_duplicates).await
}

async fn setup_with(root: &TempDir, tweak: impl FnOnce(&mut WatchConfig)) -> (Config, IngestPipeline) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("asn_ingest=debug")
        .with_test_writer()
        .try_init();

    let mut config = Config {
        database: DatabaseConfig {
            path: root.path().join("asn.db"),
            ..DatabaseConfig::default()
        },
        folders: FolderConfig::rooted_at(root.path()),
        ..Config::default()
    };
    config.watch.settle_poll_interval_ms = 20;
    config.watch.settle_max_polls = 50;
    tweak(&mut config.watch);
    std::fs::create_dir_all(config.folders.inbox_path()).unwrap();

    let pool = db::connect(&config.database).await.unwrap();
    let pipeline = IngestPipeline::new(pool, &config);
    (config, pipeline)
}

fn start(config: &Config, pipeline: IngestPipeline, cancel: &CancellationToken) -> JoinHandle<WatchSummary> {
    let watcher = InboxWatcher::new(pipeline, &config.folders, config.watch.clone());
    let cancel = cancel.clone();
    tokio::spawn(async move { watcher.run(cancel).await.unwrap() })
}

async fn wait_for(path: &Path) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", path.display()));
}

#[tokio::test]
async fn test_startup_scan_ingests_existing_files() {
    let root = TempDir::new().unwrap();
    let (config, pipeline) = setup(&root, false).await;
    let inbox_file = config.folders.inbox_path().join("asn_001.txt");
    std::fs::write(&inbox_file, MANIFEST).unwrap();
    std::fs::write(config.folders.inbox_path().join("readme.md"), "ignored").unwrap();

    let cancel = CancellationToken::new();
    let handle = start(&config, pipeline, &cancel);

    wait_for(&config.folders.archive_path().join("asn_001.txt")).await;
    cancel.cancel();
    let summary = handle.await.unwrap();

    assert_eq!(summary.ingested, 1);
    assert_eq!(summary.failed, 0);
    assert!(summary.abandoned.is_empty());
    assert!(!inbox_file.exists());
    assert!(config.folders.inbox_path().join("readme.md").exists());
}

#[tokio::test]
async fn test_file_moved_in_after_start_is_ingested() {
    let root = TempDir::new().unwrap();
    let (config, pipeline) = setup(&root, false).await;

    let cancel = CancellationToken::new();
    let handle = start(&config, pipeline, &cancel);
    // Give the watcher a moment to register
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Write elsewhere and rename in, as a well-behaved producer would
    let staging = root.path().join("staging.tmp");
    std::fs::write(&staging, MANIFEST).unwrap();
    std::fs::rename(&staging, config.folders.inbox_path().join("late.txt")).unwrap();

    wait_for(&config.folders.archive_path().join("late.txt")).await;
    cancel.cancel();
    let summary = handle.await.unwrap();

    assert_eq!(summary.ingested, 1);
}

#[tokio::test]
async fn test_duplicates_are_archived_when_enabled() {
    let root = TempDir::new().unwrap();
    let (config, pipeline) = setup(&root, true).await;
    std::fs::write(config.folders.inbox_path().join("a.txt"), MANIFEST).unwrap();
    std::fs::write(config.folders.inbox_path().join("b.txt"), MANIFEST).unwrap();

    let cancel = CancellationToken::new();
    let handle = start(&config, pipeline, &cancel);

    wait_for(&config.folders.archive_path().join("a.txt")).await;
    wait_for(&config.folders.archive_path().join("b.txt")).await;
    cancel.cancel();
    let summary = handle.await.unwrap();

    assert_eq!(summary.ingested, 1);
    assert_eq!(summary.duplicates, 1);
}

#[tokio::test]
async fn test_file_that_never_settles_is_still_routed() {
    let root = TempDir::new().unwrap();
    let (config, pipeline) = setup_with(&root, |watch| {
        watch.settle_poll_interval_ms = 10;
        watch.settle_max_polls = 3;
    })
    .await;
    // An empty file never counts as settled
    let inbox_file = config.folders.inbox_path().join("empty.txt");
    std::fs::write(&inbox_file, b"").unwrap();

    let cancel = CancellationToken::new();
    let handle = start(&config, pipeline, &cancel);

    wait_for(&config.folders.archive_path().join("empty.txt")).await;
    cancel.cancel();
    let summary = handle.await.unwrap();

    assert_eq!(summary.ingested, 1);
    assert_eq!(summary.skipped, 0);
    assert!(!inbox_file.exists());
    assert!(!config.folders.failed_path().join("empty.txt").exists());
}

#[tokio::test]
async fn test_shutdown_before_work_leaves_files_in_inbox() {
    let root = TempDir::new().unwrap();
    let (config, pipeline) = setup(&root, false).await;
    let inbox_file = config.folders.inbox_path().join("asn.txt");
    std::fs::write(&inbox_file, MANIFEST).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = start(&config, pipeline, &cancel).await.unwrap();

    assert_eq!(summary.ingested, 0);
    assert!(inbox_file.exists());
    assert!(!config.folders.archive_path().join("asn.txt").exists());
}
