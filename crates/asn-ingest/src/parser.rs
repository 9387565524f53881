//! Shipment manifest parser
//!
//! Turns a manifest byte stream into a lazy sequence of [`ShipmentBox`]es.
//!
//! # File Format
//! ```text
//! HDR  TRSP117                 6874453I
//! LINE P000001661              9781473663800        12
//! LINE P000001661              9781473667273        2
//! ```
//!
//! Tokens are whitespace-delimited and column padding is cosmetic. A header
//! has exactly three tokens and a detail exactly four. Anything else (blank
//! lines, unknown keywords, wrong token counts, details before the first
//! header) is dropped without error, and an unparsable quantity becomes 0.
//!
//! A box is emitted when the next header arrives or the stream ends, so the
//! consumer can act on each box while the rest of the file is still unread.

use asn_common::types::{BoxLine, ShipmentBox};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{IngestError, Result};

pub const HEADER_KEYWORD: &str = "HDR";
pub const DETAIL_KEYWORD: &str = "LINE";

/// Byte source handed to a parser
pub type ManifestInput = Box<dyn AsyncRead + Send + Unpin>;

/// Source of parsed boxes for the write path
pub trait ManifestParser: Send + Sync {
    /// Stream the boxes in `input`. The stream ends early, without flushing the
    /// open box, once `cancel` fires.
    fn parse(
        &self,
        input: ManifestInput,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<ShipmentBox>>;
}

/// Parser for the `HDR` / `LINE` text format
#[derive(Debug, Default, Clone, Copy)]
pub struct TextManifestParser;

impl ManifestParser for TextManifestParser {
    fn parse(
        &self,
        input: ManifestInput,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<ShipmentBox>> {
        let reader = ManifestReader::new(input, cancel);
        stream::try_unfold(reader, |mut reader| async move {
            let next = reader.next_box().await?;
            Ok::<_, IngestError>(next.map(|shipment| (shipment, reader)))
        })
        .boxed()
    }
}

/// One classified manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Header(ShipmentBox),
    Detail(BoxLine),
    Ignored,
}

/// Quantities are signed 32-bit in the feed; anything outside `0..=i32::MAX`
/// is treated as unparsable.
fn parse_quantity(token: &str) -> u32 {
    token
        .parse::<i32>()
        .ok()
        .and_then(|quantity| u32::try_from(quantity).ok())
        .unwrap_or(0)
}

/// Classify a single line. Trailing whitespace (including `\r`) is stripped
/// before matching.
pub fn classify(raw: &str) -> Record {
    let mut tokens = raw.trim_end().split_whitespace();

    match tokens.next() {
        Some(HEADER_KEYWORD) => match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(supplier), Some(identifier), None) => {
                Record::Header(ShipmentBox::new(supplier, identifier))
            }
            _ => Record::Ignored,
        },
        Some(DETAIL_KEYWORD) => {
            match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
                (Some(po_number), Some(isbn), Some(quantity), None) => {
                    Record::Detail(BoxLine::new(po_number, isbn, parse_quantity(quantity)))
                }
                _ => Record::Ignored,
            }
        }
        _ => Record::Ignored,
    }
}

/// Whether a box is currently accumulating lines
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum ParserState {
    #[default]
    NoOpenBox,
    OpenBox(ShipmentBox),
}

impl ParserState {
    /// Apply one record. Returns the next state and the box completed by this
    /// record, if any: a header closes the open box before opening its own.
    pub fn advance(self, record: Record) -> (ParserState, Option<ShipmentBox>) {
        match (self, record) {
            (previous, Record::Header(next)) => (ParserState::OpenBox(next), previous.finish()),
            (ParserState::OpenBox(mut open), Record::Detail(line)) => {
                open.push_line(line);
                (ParserState::OpenBox(open), None)
            }
            (ParserState::NoOpenBox, Record::Detail(_)) => (ParserState::NoOpenBox, None),
            (state, Record::Ignored) => (state, None),
        }
    }

    /// End of input: the open box, if any, is the final element
    pub fn finish(self) -> Option<ShipmentBox> {
        match self {
            ParserState::NoOpenBox => None,
            ParserState::OpenBox(open) => Some(open),
        }
    }
}

/// Pull-based reader yielding one completed box at a time
pub struct ManifestReader<R> {
    reader: BufReader<R>,
    state: ParserState,
    cancel: CancellationToken,
    buffer: Vec<u8>,
    lines_read: u64,
    lines_ignored: u64,
    finished: bool,
}

impl<R: AsyncRead + Unpin> ManifestReader<R> {
    pub fn new(input: R, cancel: CancellationToken) -> Self {
        Self {
            reader: BufReader::new(input),
            state: ParserState::NoOpenBox,
            cancel,
            buffer: Vec::with_capacity(256),
            lines_read: 0,
            lines_ignored: 0,
            finished: false,
        }
    }

    /// Read until the next box completes. `Ok(None)` once the input is
    /// exhausted or cancellation was observed.
    pub async fn next_box(&mut self) -> Result<Option<ShipmentBox>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            if self.cancel.is_cancelled() {
                debug!(lines_read = self.lines_read, "Manifest parse cancelled");
                self.finished = true;
                return Ok(None);
            }

            self.buffer.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.buffer)
                .await
                .map_err(IngestError::Io)?;

            if read == 0 {
                self.finished = true;
                debug!(
                    lines_read = self.lines_read,
                    lines_ignored = self.lines_ignored,
                    "Manifest parse complete"
                );
                return Ok(std::mem::take(&mut self.state).finish());
            }

            self.lines_read += 1;
            let record = classify(&String::from_utf8_lossy(&self.buffer));
            if record == Record::Ignored {
                self.lines_ignored += 1;
            }

            let (state, completed) = std::mem::take(&mut self.state).advance(record);
            self.state = state;
            if completed.is_some() {
                return Ok(completed);
            }
        }
    }
}
