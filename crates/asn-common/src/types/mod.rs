//! Common types used across the ASN processor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::ContentHash;

// ============================================================================
// Manifest Records
// ============================================================================

/// One shipping carton from a manifest: the `HDR` record plus its `LINE` items.
///
/// A parsed box carries no durable identity; the writer assigns one when the
/// box is inserted. `(supplier_identifier, identifier)` is unique across all
/// persisted boxes.
///
/// # Examples
///
/// ```rust
/// use asn_common::types::{BoxLine, ShipmentBox};
///
/// let mut shipment = ShipmentBox::new("TRSP117", "6874453I");
/// shipment.push_line(BoxLine::new("P000001661", "9781473663800", 12));
/// assert_eq!(shipment.lines.len(), 1);
/// assert_eq!(shipment.key(), ("TRSP117", "6874453I"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentBox {
    /// Supplier token from the header line
    pub supplier_identifier: String,

    /// Box token from the header line
    pub identifier: String,

    /// Items in file order
    pub lines: Vec<BoxLine>,
}

impl ShipmentBox {
    pub fn new(supplier_identifier: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            supplier_identifier: supplier_identifier.into(),
            identifier: identifier.into(),
            lines: Vec::new(),
        }
    }

    pub fn push_line(&mut self, line: BoxLine) {
        self.lines.push(line);
    }

    /// Natural key of the box
    pub fn key(&self) -> (&str, &str) {
        (&self.supplier_identifier, &self.identifier)
    }
}

/// A single item entry within a box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxLine {
    /// Purchase-order number
    pub po_number: String,

    /// Product identifier
    pub isbn: String,

    /// Units shipped; zero when the source value was unparsable
    pub quantity: u32,
}

impl BoxLine {
    pub fn new(po_number: impl Into<String>, isbn: impl Into<String>, quantity: u32) -> Self {
        Self {
            po_number: po_number.into(),
            isbn: isbn.into(),
            quantity,
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Ledger row recording that a file's content has been ingested.
///
/// `content_hash` is the idempotency key: byte-identical content is ingested
/// at most once, whatever the file is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub id: i64,

    /// Name of the file (without directory) at ingestion time
    pub file_name: String,

    pub content_hash: ContentHash,

    pub processed_at: DateTime<Utc>,
}

/// A ledger row that has not been written yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProcessedFile {
    pub file_name: String,
    pub content_hash: ContentHash,
    pub processed_at: DateTime<Utc>,
}

impl NewProcessedFile {
    /// Ledger entry stamped with the current time
    pub fn now(file_name: impl Into<String>, content_hash: ContentHash) -> Self {
        Self {
            file_name: file_name.into(),
            content_hash,
            processed_at: Utc::now(),
        }
    }
}
