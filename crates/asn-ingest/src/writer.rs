//! Batched transactional writer
//!
//! Persists every box of one file plus that file's ledger row inside a single
//! transaction. Boxes are buffered up to `batch_size` and flushed as
//! multi-row inserts; the transaction only commits after the ledger row is in,
//! so a failure at any point leaves neither boxes nor ledger behind.

use asn_common::types::{BoxLine, NewProcessedFile, ShipmentBox};
use futures::{Stream, TryStreamExt};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::{ledger, SQLITE_MAX_BIND_PARAMS};
use crate::error::{IngestError, Result};

/// Box rows per INSERT (two bound columns)
const BOXES_PER_STATEMENT: usize = SQLITE_MAX_BIND_PARAMS / 2;

/// Line rows per INSERT (four bound columns)
const LINES_PER_STATEMENT: usize = SQLITE_MAX_BIND_PARAMS / 4;

/// Rows written by one transaction
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    pub boxes: u64,
    pub lines: u64,
    pub batches: u64,
}

#[derive(Clone)]
pub struct BatchWriter {
    pool: SqlitePool,
    batch_size: usize,
}

impl BatchWriter {
    /// `batch_size` counts boxes and is clamped to at least 1
    pub fn new(pool: SqlitePool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Drain `boxes` into the store and record `entry` in the ledger, all or
    /// nothing.
    ///
    /// Cancellation is observed between flushes and again just before commit;
    /// either way the transaction is rolled back and
    /// [`IngestError::Cancelled`] is returned.
    pub async fn write<S>(
        &self,
        boxes: S,
        entry: &NewProcessedFile,
        cancel: &CancellationToken,
    ) -> Result<WriteStats>
    where
        S: Stream<Item = Result<ShipmentBox>> + Unpin,
    {
        let mut tx = self.pool.begin().await?;

        match self.write_in_transaction(&mut tx, boxes, entry, cancel).await {
            Ok(stats) => {
                tx.commit().await?;
                info!(
                    file_name = %entry.file_name,
                    boxes = stats.boxes,
                    lines = stats.lines,
                    batches = stats.batches,
                    "Committed manifest"
                );
                Ok(stats)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                debug!(file_name = %entry.file_name, error = %err, "Rolled back manifest");
                Err(err)
            }
        }
    }

    async fn write_in_transaction<S>(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        mut boxes: S,
        entry: &NewProcessedFile,
        cancel: &CancellationToken,
    ) -> Result<WriteStats>
    where
        S: Stream<Item = Result<ShipmentBox>> + Unpin,
    {
        let mut stats = WriteStats::default();
        let mut pending: Vec<ShipmentBox> = Vec::with_capacity(self.batch_size.min(1024));

        while let Some(shipment) = boxes.try_next().await? {
            pending.push(shipment);

            if pending.len() >= self.batch_size {
                if cancel.is_cancelled() {
                    return Err(IngestError::Cancelled);
                }
                self.flush(tx, &pending, &mut stats).await?;
                pending.clear();
            }
        }

        // The parser ends its stream quietly on cancellation, so a short
        // stream is indistinguishable from a complete one without this check.
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        if !pending.is_empty() {
            self.flush(tx, &pending, &mut stats).await?;
        }

        ledger::record(&mut **tx, entry).await?;

        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        Ok(stats)
    }

    async fn flush(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        batch: &[ShipmentBox],
        stats: &mut WriteStats,
    ) -> Result<()> {
        let box_ids = insert_boxes(tx, batch).await?;

        let mut lines: Vec<(i64, &BoxLine)> = Vec::new();
        for shipment in batch {
            let (supplier, identifier) = shipment.key();
            let key = (supplier.to_owned(), identifier.to_owned());
            let box_id = *box_ids.get(&key).ok_or_else(|| {
                IngestError::Database(sqlx::Error::Protocol(format!(
                    "insert returned no id for box {supplier}/{identifier}"
                )))
            })?;
            lines.extend(shipment.lines.iter().map(|line| (box_id, line)));
        }

        insert_lines(tx, &lines).await?;

        stats.boxes += batch.len() as u64;
        stats.lines += lines.len() as u64;
        stats.batches += 1;

        debug!(
            batch = stats.batches,
            boxes = batch.len(),
            lines = lines.len(),
            "Flushed batch"
        );

        Ok(())
    }
}

/// Insert boxes and map each natural key to the id SQLite assigned
async fn insert_boxes(
    tx: &mut Transaction<'_, Sqlite>,
    batch: &[ShipmentBox],
) -> Result<HashMap<(String, String), i64>> {
    let mut ids = HashMap::with_capacity(batch.len());

    for chunk in batch.chunks(BOXES_PER_STATEMENT) {
        let mut query_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO boxes (supplier_identifier, identifier) ");

        query_builder.push_values(chunk, |mut b, shipment| {
            b.push_bind(shipment.supplier_identifier.as_str())
                .push_bind(shipment.identifier.as_str());
        });
        query_builder.push(" RETURNING id, supplier_identifier, identifier");

        let rows: Vec<(i64, String, String)> = query_builder
            .build_query_as()
            .fetch_all(&mut **tx)
            .await?;

        for (id, supplier_identifier, identifier) in rows {
            ids.insert((supplier_identifier, identifier), id);
        }
    }

    Ok(ids)
}

async fn insert_lines(tx: &mut Transaction<'_, Sqlite>, lines: &[(i64, &BoxLine)]) -> Result<()> {
    for chunk in lines.chunks(LINES_PER_STATEMENT) {
        let mut query_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO box_lines (box_id, po_number, isbn, quantity) ");

        query_builder.push_values(chunk, |mut b, &(box_id, line)| {
            b.push_bind(box_id)
                .push_bind(line.po_number.as_str())
                .push_bind(line.isbn.as_str())
                .push_bind(i64::from(line.quantity));
        });

        query_builder.build().execute(&mut **tx).await?;
    }

    Ok(())
}
