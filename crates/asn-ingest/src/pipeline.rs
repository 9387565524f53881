//! Per-file ingestion pipeline
//!
//! ```text
//! fingerprint ──► already processed? ──yes──► AlreadyProcessed
//!                       │ no
//!                       ▼
//!                parse ─► batched write ─► commit ─► archive ─► Ingested
//!                       │ any error
//!                       ▼
//!                 move to failed ─► error returned
//! ```
//!
//! Cancellation is the one error that leaves the file where it is, so the
//! next start-up scan retries it.

use asn_common::types::{NewProcessedFile, ProcessedFile};
use asn_common::ContentHash;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{IngestError, Result};
use crate::fingerprint::FingerprintGuard;
use crate::parser::{ManifestParser, TextManifestParser};
use crate::router::FileRouter;
use crate::writer::{BatchWriter, WriteStats};

/// Summary of a newly ingested file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub content_hash: ContentHash,
    pub boxes: u64,
    pub lines: u64,
    pub batches: u64,
    pub archived_to: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Identical content was ingested before; nothing was written or moved
    AlreadyProcessed {
        content_hash: ContentHash,
        first_seen: Option<ProcessedFile>,
    },
    Ingested(IngestReport),
}

impl IngestOutcome {
    pub fn content_hash(&self) -> &ContentHash {
        match self {
            Self::AlreadyProcessed { content_hash, .. } => content_hash,
            Self::Ingested(report) => &report.content_hash,
        }
    }
}

#[derive(Clone)]
pub struct IngestPipeline {
    guard: FingerprintGuard,
    parser: Arc<dyn ManifestParser>,
    writer: BatchWriter,
    router: FileRouter,
}

impl IngestPipeline {
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        Self::with_parser(pool, config, Arc::new(TextManifestParser))
    }

    /// Pipeline with a custom parser implementation
    pub fn with_parser(pool: SqlitePool, config: &Config, parser: Arc<dyn ManifestParser>) -> Self {
        Self {
            guard: FingerprintGuard::new(pool.clone()),
            parser,
            writer: BatchWriter::new(pool, config.ingest.batch_size),
            router: FileRouter::from_folders(&config.folders),
        }
    }

    pub fn router(&self) -> &FileRouter {
        &self.router
    }

    /// Ingest one manifest file exactly once.
    ///
    /// Errors from fingerprinting (including [`IngestError::SourceNotFound`])
    /// happen before any side effect and leave the file untouched. Errors
    /// while parsing or writing move the file to the failed folder first.
    #[tracing::instrument(skip(self, path, cancel), fields(path = %path.display()))]
    pub async fn ingest(&self, path: &Path, cancel: &CancellationToken) -> Result<IngestOutcome> {
        let fingerprint = self.guard.compute_and_check(path).await?;
        let content_hash = fingerprint.content_hash;

        if fingerprint.already_processed {
            let first_seen = self.guard.first_seen(&content_hash).await?;
            info!(
                content_hash = %content_hash,
                first_file = first_seen.as_ref().map(|row| row.file_name.as_str()),
                "Content already ingested, skipping"
            );
            return Ok(IngestOutcome::AlreadyProcessed {
                content_hash,
                first_seen,
            });
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let entry = NewProcessedFile::now(file_name, content_hash);

        match self.parse_and_write(path, &entry, cancel).await {
            Ok(stats) => {
                let archived_to = self.router.on_success(path).await?;
                info!(
                    content_hash = %content_hash,
                    boxes = stats.boxes,
                    lines = stats.lines,
                    "Manifest ingested"
                );
                Ok(IngestOutcome::Ingested(IngestReport {
                    content_hash,
                    boxes: stats.boxes,
                    lines: stats.lines,
                    batches: stats.batches,
                    archived_to,
                }))
            }
            Err(IngestError::Cancelled) => {
                warn!("Ingestion cancelled, file left in place");
                Err(IngestError::Cancelled)
            }
            Err(err) => Err(self.router.on_failure(path, err).await),
        }
    }

    async fn parse_and_write(
        &self,
        path: &Path,
        entry: &NewProcessedFile,
        cancel: &CancellationToken,
    ) -> Result<WriteStats> {
        // The stream owns the file handle and is dropped inside `write`, so the
        // file is closed again before the router moves it.
        let file = tokio::fs::File::open(path).await?;
        let boxes = self.parser.parse(Box::new(file), cancel.clone());
        self.writer.write(boxes, entry, cancel).await
    }
}
