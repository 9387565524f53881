//! Inbox watcher
//!
//! File-system events and a start-up scan feed a bounded [`WorkQueue`]; a
//! single worker drains it, waits for each file to settle and hands it to the
//! [`IngestPipeline`]. Cancelling the token stops intake, lets the in-flight
//! file roll back, and reports whatever was still queued.

pub mod queue;
pub mod readiness;

pub use queue::{work_queue, QueueClosed, WorkQueue, WorkReceiver};
pub use readiness::{wait_until_settled, Readiness};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{FolderConfig, WatchConfig};
use crate::error::{IngestError, Result};
use crate::pipeline::{IngestOutcome, IngestPipeline};

/// What one watch session did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchSummary {
    pub ingested: u64,
    pub duplicates: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Paths still queued or in flight at shutdown; they stay in the inbox
    pub abandoned: Vec<PathBuf>,
}

pub struct InboxWatcher {
    pipeline: IngestPipeline,
    inbox: PathBuf,
    config: WatchConfig,
}

impl InboxWatcher {
    pub fn new(pipeline: IngestPipeline, folders: &FolderConfig, config: WatchConfig) -> Self {
        Self {
            pipeline,
            inbox: folders.inbox_path(),
            config,
        }
    }

    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    /// Watch the inbox until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) -> Result<WatchSummary> {
        tokio::fs::create_dir_all(&self.inbox).await?;

        let (queue, mut receiver) = work_queue(self.config.queue_capacity);
        let watcher = self.start_notify(queue.clone())?;

        info!(
            inbox = %self.inbox.display(),
            extension = %self.config.file_extension,
            queue_capacity = self.config.queue_capacity,
            "Watching inbox"
        );

        let scan = self.enqueue_existing(&queue, &cancel);
        let work = self.work(&mut receiver, &cancel);
        let (scanned, mut summary) = tokio::join!(scan, work);
        match scanned {
            Ok(count) => debug!(count, "Start-up scan complete"),
            Err(err) => warn!(error = %err, "Start-up scan failed"),
        }

        // Close the queue before stopping notify so a callback blocked on a
        // full queue is released.
        summary.abandoned.extend(receiver.drain());
        drop(watcher);

        for path in &summary.abandoned {
            warn!(path = %path.display(), "Abandoned at shutdown, left in inbox");
        }
        info!(
            ingested = summary.ingested,
            duplicates = summary.duplicates,
            failed = summary.failed,
            skipped = summary.skipped,
            abandoned = summary.abandoned.len(),
            "Inbox watcher stopped"
        );

        Ok(summary)
    }

    fn start_notify(&self, queue: WorkQueue) -> Result<RecommendedWatcher> {
        let config = self.config.clone();

        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    if !is_arrival(&event.kind) {
                        return;
                    }
                    for path in event.paths.into_iter().filter(|p| config.matches(p)) {
                        if let Err(closed) = queue.enqueue_blocking(path) {
                            debug!(error = %closed, "Event after shutdown");
                        }
                    }
                }
                Err(err) => error!(error = %err, "Notify error"),
            })?;

        watcher.watch(&self.inbox, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }

    async fn enqueue_existing(&self, queue: &WorkQueue, cancel: &CancellationToken) -> io::Result<usize> {
        let existing = scan_inbox(&self.inbox, &self.config).await?;
        let mut queued = 0;

        for path in existing {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = queue.enqueue(path) => match result {
                    Ok(true) => queued += 1,
                    Ok(false) => {}
                    Err(_) => break,
                },
            }
        }

        Ok(queued)
    }

    async fn work(&self, receiver: &mut WorkReceiver, cancel: &CancellationToken) -> WatchSummary {
        let mut summary = WatchSummary::default();

        loop {
            let path = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(path) => path,
                    None => break,
                },
            };

            self.handle(path, cancel, &mut summary).await;
        }

        summary
    }

    async fn handle(&self, path: PathBuf, cancel: &CancellationToken, summary: &mut WatchSummary) {
        let readiness = wait_until_settled(
            &path,
            self.config.settle_poll_interval(),
            self.config.settle_max_polls,
            cancel,
        )
        .await;

        match readiness {
            Ok(Readiness::Ready(_)) => {}
            Ok(Readiness::Vanished) => {
                debug!(path = %path.display(), "File vanished before ingestion");
                summary.skipped += 1;
                return;
            }
            Ok(Readiness::Unsettled) => {
                warn!(
                    path = %path.display(),
                    polls = self.config.settle_max_polls,
                    "File did not settle, ingesting anyway"
                );
            }
            Ok(Readiness::Cancelled) => {
                summary.abandoned.push(path);
                return;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Could not stat file");
                summary.skipped += 1;
                return;
            }
        }

        match self.pipeline.ingest(&path, cancel).await {
            Ok(IngestOutcome::Ingested(_)) => summary.ingested += 1,
            Ok(IngestOutcome::AlreadyProcessed { .. }) => {
                summary.duplicates += 1;
                if self.config.archive_duplicates {
                    if let Err(err) = self.pipeline.router().on_success(&path).await {
                        warn!(path = %path.display(), error = %err, "Could not archive duplicate");
                    }
                }
            }
            Err(IngestError::Cancelled) => summary.abandoned.push(path),
            Err(err) => {
                error!(path = %path.display(), error = %err, "Ingestion failed");
                summary.failed += 1;
            }
        }
    }
}

/// Events that may mean a file appeared or grew in the inbox. Renames away
/// from the inbox (our own archive moves included) are not arrivals.
fn is_arrival(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

/// Regular files in `inbox` with the watched extension, sorted by name
pub async fn scan_inbox(inbox: &Path, config: &WatchConfig) -> io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(inbox).await?;
    let mut found = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && config.matches(&path) {
            found.push(path);
        }
    }

    found.sort();
    Ok(found)
}
