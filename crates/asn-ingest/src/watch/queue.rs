//! Bounded, de-duplicating queue of inbox paths
//!
//! A path is "pending" from the moment it is enqueued until the worker takes
//! it; enqueueing a pending path again is a no-op. Enqueueing into a full
//! queue waits, which pushes back on the event source.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;

/// The receiving side is gone; the path was not queued
#[derive(Debug, Error)]
#[error("work queue closed, dropped '{}'", .0.display())]
pub struct QueueClosed(pub PathBuf);

type Pending = Arc<Mutex<HashSet<PathBuf>>>;

fn lock(pending: &Pending) -> MutexGuard<'_, HashSet<PathBuf>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create a queue holding at most `capacity` paths
pub fn work_queue(capacity: usize) -> (WorkQueue, WorkReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let pending: Pending = Arc::default();
    (
        WorkQueue {
            sender,
            pending: Arc::clone(&pending),
        },
        WorkReceiver { receiver, pending },
    )
}

#[derive(Debug, Clone)]
pub struct WorkQueue {
    sender: mpsc::Sender<PathBuf>,
    pending: Pending,
}

impl WorkQueue {
    /// Queue `path`, waiting for room. `Ok(false)` when it was already pending.
    pub async fn enqueue(&self, path: PathBuf) -> Result<bool, QueueClosed> {
        if !self.claim(&path) {
            return Ok(false);
        }
        match self.sender.send(path).await {
            Ok(()) => Ok(true),
            Err(mpsc::error::SendError(path)) => Err(self.release(path)),
        }
    }

    /// Blocking variant for callers outside the async runtime, such as the
    /// file-system notification thread
    pub fn enqueue_blocking(&self, path: PathBuf) -> Result<bool, QueueClosed> {
        if !self.claim(&path) {
            return Ok(false);
        }
        match self.sender.blocking_send(path) {
            Ok(()) => Ok(true),
            Err(mpsc::error::SendError(path)) => Err(self.release(path)),
        }
    }

    fn claim(&self, path: &Path) -> bool {
        lock(&self.pending).insert(path.to_path_buf())
    }

    fn release(&self, path: PathBuf) -> QueueClosed {
        lock(&self.pending).remove(&path);
        QueueClosed(path)
    }
}

#[derive(Debug)]
pub struct WorkReceiver {
    receiver: mpsc::Receiver<PathBuf>,
    pending: Pending,
}

impl WorkReceiver {
    /// Next path, or `None` once every sender is dropped and the queue is empty
    pub async fn recv(&mut self) -> Option<PathBuf> {
        let path = self.receiver.recv().await?;
        lock(&self.pending).remove(&path);
        Some(path)
    }

    /// Close the queue and return whatever was still waiting in it
    pub fn drain(&mut self) -> Vec<PathBuf> {
        self.receiver.close();
        let mut remaining = Vec::new();
        while let Ok(path) = self.receiver.try_recv() {
            remaining.push(path);
        }
        lock(&self.pending).clear();
        remaining
    }

    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }
}
