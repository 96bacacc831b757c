//! Range type and chunk-file naming.

use std::path::{Path, PathBuf};

/// Prefix of every chunk file inside a recovery directory.
const CHUNK_PREFIX: &str = "temp-";

/// A byte range `[start, end]` (end inclusive) backed by a chunk file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub start: u64,
    pub end: u64,
    /// True when the chunk file already holds the whole range.
    pub completed: bool,
    pub path: PathBuf,
}

impl Range {
    pub fn pending(start: u64, end: u64, dir: &Path) -> Self {
        Self {
            start,
            end,
            completed: false,
            path: dir.join(chunk_file_name(start, end)),
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// File name for the chunk holding `[start, end]`: `temp-<start>-<end>`.
pub fn chunk_file_name(start: u64, end: u64) -> String {
    format!("{}{}-{}", CHUNK_PREFIX, start, end)
}

/// Parse a chunk file name back into `(start, end)`.
/// Returns `None` for names that do not follow the pattern or declare `end < start`.
pub fn parse_chunk_file_name(name: &str) -> Option<(u64, u64)> {
    let rest = name.strip_prefix(CHUNK_PREFIX)?;
    let (start, end) = rest.split_once('-')?;
    let start = start.parse::<u64>().ok()?;
    let end = end.parse::<u64>().ok()?;
    if end < start {
        return None;
    }
    Some((start, end))
}
