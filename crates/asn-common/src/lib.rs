//! ASN Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the ASN processor.
//!
//! # Overview
//!
//! - **Types**: shipment boxes, their lines, and the processed-file ledger row
//! - **Checksums**: streaming SHA-256 content fingerprints
//! - **Logging**: tracing subscriber initialisation shared by the binaries
//! - **Error Handling**: the common error and result types
//!
//! # Example
//!
//! ```no_run
//! use asn_common::checksum::sha256_file;
//!
//! async fn fingerprint(path: &str) -> asn_common::Result<()> {
//!     let hash = sha256_file(path).await?;
//!     println!("content hash: {}", hash);
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use checksum::ContentHash;
pub use error::{AsnError, Result};
pub use types::{BoxLine, ProcessedFile, ShipmentBox};
