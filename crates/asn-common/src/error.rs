//! Error types for the ASN processor

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, AsnError>;

/// Errors shared by every ASN crate
#[derive(Error, Debug)]
pub enum AsnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid content hash: {0}")]
    InvalidHash(String),
}
