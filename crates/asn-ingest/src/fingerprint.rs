//! Content fingerprint guard
//!
//! Hashes the whole file and consults the ledger before anything is parsed.
//! The check is advisory: two workers racing on identical content both see
//! `already_processed == false`, and the ledger's unique constraint decides
//! which commit wins.

use asn_common::checksum;
use asn_common::types::ProcessedFile;
use asn_common::{AsnError, ContentHash};
use sqlx::SqlitePool;
use std::io;
use std::path::Path;
use tracing::debug;

use crate::db::ledger;
use crate::error::{IngestError, Result};

/// SHA-256 of a file plus whether the ledger already holds it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub content_hash: ContentHash,
    pub already_processed: bool,
}

#[derive(Clone)]
pub struct FingerprintGuard {
    pool: SqlitePool,
}

impl FingerprintGuard {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Hash `path` and look the digest up in the ledger.
    ///
    /// Never mutates the filesystem or the store.
    pub async fn compute_and_check(&self, path: &Path) -> Result<Fingerprint> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|err| source_error(path, err))?;
        if !metadata.is_file() {
            return Err(IngestError::SourceNotFound(path.to_path_buf()));
        }

        // The file can still disappear between the stat and the open
        let content_hash = checksum::sha256_file(path)
            .await
            .map_err(|err| hashing_error(path, err))?;
        let already_processed = ledger::is_processed(&self.pool, &content_hash).await?;

        debug!(
            path = %path.display(),
            bytes = metadata.len(),
            content_hash = %content_hash,
            already_processed,
            "Computed content fingerprint"
        );

        Ok(Fingerprint {
            content_hash,
            already_processed,
        })
    }

    /// Ledger row of the file that first carried this content
    pub async fn first_seen(&self, content_hash: &ContentHash) -> Result<Option<ProcessedFile>> {
        ledger::find(&self.pool, content_hash).await
    }
}

fn source_error(path: &Path, err: io::Error) -> IngestError {
    match err.kind() {
        io::ErrorKind::NotFound => IngestError::SourceNotFound(path.to_path_buf()),
        _ => IngestError::Io(err),
    }
}

fn hashing_error(path: &Path, err: AsnError) -> IngestError {
    match err {
        AsnError::Io(err) => source_error(path, err),
        other => other.into(),
    }
}
