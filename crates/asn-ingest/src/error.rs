//! Ingestion error types
//!
//! Duplicate content and malformed lines are deliberately absent: the first is
//! the [`IngestOutcome::AlreadyProcessed`](crate::pipeline::IngestOutcome)
//! success value, the second is dropped silently by the parser.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Input path does not exist or is not a regular file
    #[error("Source file not found: '{}'", .0.display())]
    SourceNotFound(PathBuf),

    /// A uniqueness constraint rejected the write (duplicate box identity or
    /// a racing duplicate content hash)
    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown was requested before the transaction committed
    #[error("Ingestion cancelled before commit")]
    Cancelled,

    /// Moving a failed file into the failure folder itself failed
    #[error("Failed to move '{}' to the failure folder: {source} (ingestion error: {cause})", .path.display())]
    FailureRouting {
        path: PathBuf,
        source: std::io::Error,
        cause: Box<IngestError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Inbox watch failed: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Common(#[from] asn_common::AsnError),
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True when the error is a uniqueness conflict in the store
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::PersistenceConflict(_))
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        let conflict = err
            .as_database_error()
            .filter(|db_err| db_err.is_unique_violation())
            .map(|db_err| db_err.message().to_string());

        match conflict {
            Some(message) => Self::PersistenceConflict(message),
            None => Self::Database(err),
        }
    }
}
