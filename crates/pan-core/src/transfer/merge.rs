//! Reorder buffer and the in-order merger.
//!
//! Workers complete ranges in any order; the merger holds early arrivals in a
//! [`ReorderBuffer`] and appends chunk files to the destination strictly by
//! ascending index, deleting each one once it is copied.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::task::ChunkTask;
use crate::error::TransferError;
use crate::recovery;

/// Out-of-order arrivals keyed by sequence index.
#[derive(Debug)]
pub(crate) struct ReorderBuffer<T> {
    held: BTreeMap<usize, T>,
    next: usize,
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            held: BTreeMap::new(),
            next: 0,
        }
    }

    pub fn insert(&mut self, index: usize, item: T) {
        if index < self.next {
            tracing::warn!(index, next = self.next, "ignoring completion for merged index");
            return;
        }
        self.held.insert(index, item);
    }

    /// Take the item for the next expected index, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<T> {
        let item = self.held.remove(&self.next)?;
        self.next += 1;
        Some(item)
    }

    /// Next index the destination is waiting for.
    pub fn next_index(&self) -> usize {
        self.next
    }

    pub fn held(&self) -> usize {
        self.held.len()
    }
}

/// Destination of a merge.
pub(crate) type Sink = Box<dyn Write + Send>;

/// Consume completions until `count` chunks are appended to `sink`, then remove
/// `recovery_dir`. Returns the number of bytes appended.
///
/// Stops with [`TransferError::Shutdown`] when `done` is cancelled first; chunk
/// files not yet merged stay on disk.
pub(crate) async fn merge_chunks(
    mut sink: Sink,
    mut completions: mpsc::UnboundedReceiver<ChunkTask>,
    count: usize,
    recovery_dir: PathBuf,
    done: CancellationToken,
) -> Result<u64, TransferError> {
    let mut buffer = ReorderBuffer::new();
    let mut written = 0u64;

    while buffer.next_index() < count {
        if let Some(task) = buffer.pop_ready() {
            if done.is_cancelled() {
                return Err(TransferError::Shutdown);
            }
            let (s, n) = tokio::task::spawn_blocking(move || append_chunk(sink, &task)).await??;
            sink = s;
            written += n;
            continue;
        }

        let next = tokio::select! {
            biased;
            _ = done.cancelled() => return Err(TransferError::Shutdown),
            task = completions.recv() => task,
        };
        match next {
            Some(task) => {
                tracing::trace!(index = task.index, waiting_for = buffer.next_index(), "chunk completed");
                buffer.insert(task.index, task);
            }
            None => {
                return Err(TransferError::Join(format!(
                    "workers stopped with {} of {} chunks merged",
                    buffer.next_index(),
                    count
                )))
            }
        }
    }

    tokio::task::spawn_blocking(move || {
        sink.flush()
            .map_err(|e| TransferError::storage("flush destination", e))?;
        recovery::remove_dir(&recovery_dir)
    })
    .await??;
    Ok(written)
}

/// Append one chunk file to `sink` and delete it.
fn append_chunk(mut sink: Sink, task: &ChunkTask) -> Result<(Sink, u64), TransferError> {
    let mut file = File::open(&task.path)
        .map_err(|e| TransferError::storage(format!("open {}", task.path.display()), e))?;
    let copied = io::copy(&mut file, &mut sink)
        .map_err(|e| TransferError::storage(format!("merge {}", task.path.display()), e))?;
    if copied != task.len() {
        return Err(TransferError::storage(
            format!("merge {}", task.path.display()),
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("chunk holds {} bytes, expected {}", copied, task.len()),
            ),
        ));
    }
    drop(file);
    fs::remove_file(&task.path)
        .map_err(|e| TransferError::storage(format!("remove {}", task.path.display()), e))?;
    tracing::debug!(index = task.index, start = task.start, end = task.end, "merged chunk");
    Ok((sink, copied))
}
