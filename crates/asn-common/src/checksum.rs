//! Content fingerprints for manifest files
//!
//! A fingerprint is the SHA-256 digest of a file's full byte content. Files are
//! streamed through the hasher in fixed-size chunks, never loaded whole.

use crate::error::{AsnError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Size of the read buffer used while hashing
const HASH_BUFFER_SIZE: usize = 8192;

/// Length in bytes of a SHA-256 digest
pub const CONTENT_HASH_LEN: usize = 32;

/// SHA-256 digest of a file's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; CONTENT_HASH_LEN]);

impl ContentHash {
    /// Build a hash from a raw digest, as stored in the ledger
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let digest: [u8; CONTENT_HASH_LEN] = bytes.try_into().map_err(|_| {
            AsnError::InvalidHash(format!(
                "expected {} bytes, got {}",
                CONTENT_HASH_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(digest))
    }

    /// Hash an in-memory buffer
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for ContentHash {
    type Err = AsnError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| AsnError::InvalidHash(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

/// Compute the content hash of a file, streaming it through the async runtime
pub async fn sha256_file(path: impl AsRef<Path>) -> Result<ContentHash> {
    let mut file = tokio::fs::File::open(path.as_ref()).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(ContentHash(hasher.finalize().into()))
}
