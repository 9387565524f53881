//! Wait for a dropped file to be completely written
//!
//! A file counts as settled once it is non-empty, can be opened for reading,
//! and reports the same size on two consecutive polls.

use std::io;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Stable at this many bytes
    Ready(u64),
    /// Removed or renamed away while polling
    Vanished,
    /// Still changing (or still locked) after the last poll
    Unsettled,
    Cancelled,
}

pub async fn wait_until_settled(
    path: &Path,
    interval: Duration,
    max_polls: u32,
    cancel: &CancellationToken,
) -> io::Result<Readiness> {
    let mut previous: Option<u64> = None;

    for poll in 0..max_polls.max(2) {
        if poll > 0 {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(Readiness::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
        }

        let size = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Readiness::Vanished),
            Err(err) => return Err(err),
        };

        let readable = match tokio::fs::File::open(path).await {
            Ok(_) => true,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Readiness::Vanished),
            Err(_) => false,
        };

        trace!(path = %path.display(), poll, size, readable, "Readiness poll");

        if readable && size > 0 && previous == Some(size) {
            return Ok(Readiness::Ready(size));
        }
        previous = Some(size);
    }

    Ok(Readiness::Unsettled)
}
