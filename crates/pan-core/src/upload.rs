//! Sequential fixed-size windows over a local file for multipart uploads.
//!
//! Provider upload APIs want parts in strict order, so there is no concurrency
//! here: call [`ChunkedUploadReader::next_chunk`], read the window to its end,
//! hand it to the provider, repeat until [`ChunkedUploadReader::is_finished`].

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::TransferError;
use crate::progress::format_throughput;

#[derive(Debug)]
pub struct ChunkedUploadReader {
    file: File,
    path: PathBuf,
    part_size: u64,
    total: u64,
    /// Bytes of completed parts, including those uploaded by earlier runs.
    uploaded: u64,
    current_size: u64,
    current_uploaded: u64,
    finished: bool,
    started: Instant,
}

impl ChunkedUploadReader {
    /// Open `path` and position it at `uploaded` (bytes a previous session already sent).
    pub fn open(path: &Path, part_size: u64, uploaded: u64) -> Result<Self, TransferError> {
        if part_size == 0 {
            return Err(TransferError::InvalidRequest("part size must be positive".into()));
        }
        let mut file = File::open(path)
            .map_err(|e| TransferError::storage(format!("open {}", path.display()), e))?;
        let meta = file
            .metadata()
            .map_err(|e| TransferError::storage(format!("stat {}", path.display()), e))?;
        if meta.is_dir() {
            return Err(TransferError::InvalidRequest(format!(
                "{} not a file",
                path.display()
            )));
        }
        let total = meta.len();
        if uploaded > total {
            return Err(TransferError::InvalidRequest(format!(
                "{}: {} bytes uploaded but file has {}",
                path.display(),
                uploaded,
                total
            )));
        }
        if uploaded > 0 {
            file.seek(SeekFrom::Start(uploaded))
                .map_err(|e| TransferError::storage(format!("seek {}", path.display()), e))?;
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
            part_size,
            total,
            uploaded,
            current_size: 0,
            current_uploaded: 0,
            finished: uploaded == total,
            started: Instant::now(),
        })
    }

    /// Advance to the next window. Returns `(start, end_exclusive)`.
    pub fn next_chunk(&mut self) -> (u64, u64) {
        let start = self.uploaded;
        let end = self.total.min(self.uploaded.saturating_add(self.part_size));
        self.current_size = end - start;
        self.current_uploaded = 0;
        (start, end)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded
    }

    /// Bytes read from the current window.
    pub fn current_uploaded(&self) -> u64 {
        self.current_uploaded
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Windows left, counting the current one if it is not fully read.
    pub fn remaining_parts(&self) -> u64 {
        let left = self.total - self.uploaded;
        left.div_ceil(self.part_size)
    }
}

impl Read for ChunkedUploadReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let window_left = self.current_size - self.current_uploaded;
        if window_left == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(window_left as usize);
        let n = self.file.read(&mut buf[..want])?;
        if n == 0 {
            return Ok(0);
        }
        self.current_uploaded += n as u64;
        if self.current_uploaded == self.current_size {
            self.uploaded += self.current_size;
            if self.uploaded == self.total {
                self.finished = true;
            }
            tracing::debug!(
                file = %self.path.display(),
                uploaded = self.uploaded,
                total = self.total,
                "uploading {}: {}/{} bytes, {}",
                self.path.display(),
                self.uploaded,
                self.total,
                format_throughput(self.uploaded, self.started.elapsed())
            );
        }
        Ok(n)
    }
}
