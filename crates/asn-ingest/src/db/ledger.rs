//! Processed-file ledger queries
//!
//! The ledger maps content hashes to the file that first carried them. A row
//! is only ever written inside the same transaction as that file's boxes.

use asn_common::types::{NewProcessedFile, ProcessedFile};
use asn_common::ContentHash;
use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite};

use crate::error::Result;

/// Whether content with this hash has already been ingested
pub async fn is_processed<'e, E>(executor: E, hash: &ContentHash) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let exists: i64 = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM processed_files WHERE content_hash = ?1)",
    )
    .bind(hash.as_bytes())
    .fetch_one(executor)
    .await?;

    Ok(exists != 0)
}

/// Insert a ledger row, returning its id. A duplicate hash surfaces as
/// [`IngestError::PersistenceConflict`](crate::error::IngestError).
pub async fn record<'e, E>(executor: E, entry: &NewProcessedFile) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO processed_files (file_name, content_hash, processed_at)
        VALUES (?1, ?2, ?3)
        RETURNING id
        "#,
    )
    .bind(&entry.file_name)
    .bind(entry.content_hash.as_bytes())
    .bind(entry.processed_at)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Look up the ledger row for a hash
pub async fn find<'e, E>(executor: E, hash: &ContentHash) -> Result<Option<ProcessedFile>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: Option<(i64, String, Vec<u8>, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT id, file_name, content_hash, processed_at
        FROM processed_files
        WHERE content_hash = ?1
        "#,
    )
    .bind(hash.as_bytes())
    .fetch_optional(executor)
    .await?;

    row.map(|(id, file_name, digest, processed_at)| {
        Ok(ProcessedFile {
            id,
            file_name,
            content_hash: ContentHash::from_slice(&digest)?,
            processed_at,
        })
    })
    .transpose()
}
