//! ASN Ingest Library
//!
//! Exactly-once ingestion of shipment manifest ("ASN") files into SQLite.
//!
//! # Overview
//!
//! - **Parsing**: `HDR` / `LINE` text streamed into boxes ([`parser`])
//! - **Idempotency**: whole-file SHA-256 checked against a ledger ([`fingerprint`])
//! - **Persistence**: one transaction per file, batched multi-row inserts ([`writer`])
//! - **Routing**: archive on success, failed folder on error ([`router`])
//! - **Watching**: bounded work queue fed by the inbox ([`watch`])
//!
//! # Example
//!
//! ```no_run
//! use asn_ingest::{config::Config, db, IngestPipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::connect(&config.database).await?;
//!     let pipeline = IngestPipeline::new(pool, &config);
//!
//!     let outcome = pipeline
//!         .ingest("data/inbox/asn_001.txt".as_ref(), &CancellationToken::new())
//!         .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod parser;
pub mod pipeline;
pub mod router;
pub mod watch;
pub mod writer;

// Re-export commonly used types
pub use error::{IngestError, Result};
pub use parser::{ManifestParser, TextManifestParser};
pub use pipeline::{IngestOutcome, IngestPipeline, IngestReport};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ASN ingest - shipment manifest loader
#[derive(Parser, Debug)]
#[command(name = "asn-ingest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute (defaults to `watch`)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// SQLite database file (overrides ASN_DATABASE_PATH)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Boxes per batch (overrides ASN_BATCH_SIZE)
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Watch the inbox and ingest files as they arrive
    Watch,

    /// Ingest a single manifest file and exit
    Process {
        /// Manifest file to ingest
        file: PathBuf,
    },
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut config::Config) {
        if let Some(path) = &self.database {
            config.database.path = path.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.ingest.batch_size = batch_size;
        }
    }
}
