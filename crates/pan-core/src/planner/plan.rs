//! Compute the ordered range list from the recovery directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::TransferError;

use super::manifest::MANIFEST_FILE;
use super::range::{parse_chunk_file_name, Range};

/// Inputs to [`plan_ranges`].
#[derive(Debug, Clone)]
pub struct PlanInput {
    /// Recovery directory holding chunk files.
    pub dir: PathBuf,
    /// Total object size in bytes.
    pub total: u64,
    /// Bytes per pending range; 0 selects the default.
    pub chunk_size: u64,
    /// Bytes already present in an appendable destination, independent of the
    /// recovery directory. Planning starts at this offset.
    pub written_prefix: u64,
}

/// Build the ordered partition of `[written_prefix, total)`.
///
/// Chunk files whose name does not parse, whose size disagrees with the
/// declared range, or which fall outside the planned span are deleted and
/// their bytes are planned again as pending ranges.
pub fn plan_ranges(input: &PlanInput) -> Result<Vec<Range>, TransferError> {
    let chunk_size = if input.chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        input.chunk_size
    };
    let total = input.total;
    let prefix = input.written_prefix.min(total);
    let dir = input.dir.as_path();

    let completed = scan_completed(dir, prefix, total)?;

    let mut ranges = Vec::new();
    let mut cursor = prefix;
    for r in completed.into_values() {
        if r.start < cursor {
            // Overlaps a chunk we already kept (left over from a different chunk size).
            discard(&r.path, "overlapping chunk");
            continue;
        }
        if r.start > cursor {
            fill(&mut ranges, cursor, r.start - 1, chunk_size, dir);
        }
        cursor = r.end + 1;
        ranges.push(r);
    }
    if cursor < total {
        fill(&mut ranges, cursor, total - 1, chunk_size, dir);
    }

    tracing::debug!(
        dir = %dir.display(),
        total,
        ranges = ranges.len(),
        completed = ranges.iter().filter(|r| r.completed).count(),
        "planned ranges"
    );
    Ok(ranges)
}

/// Size-valid chunk files inside the planned span, keyed by start offset.
fn scan_completed(dir: &Path, prefix: u64, total: u64) -> Result<BTreeMap<u64, Range>, TransferError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| TransferError::storage(format!("list {}", dir.display()), e))?;
    let mut completed = BTreeMap::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| TransferError::storage(format!("list {}", dir.display()), e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == MANIFEST_FILE {
            continue;
        }
        let path = entry.path();
        let Some((start, end)) = parse_chunk_file_name(&name) else {
            discard(&path, "unrecognized file");
            continue;
        };
        let meta = entry
            .metadata()
            .map_err(|e| TransferError::storage(format!("stat {}", path.display()), e))?;
        if !meta.is_file() {
            discard(&path, "not a regular file");
            continue;
        }
        let expected = end - start + 1;
        if meta.len() != expected {
            tracing::warn!(
                path = %path.display(),
                expected,
                actual = meta.len(),
                "chunk size mismatch, rescheduling"
            );
            discard(&path, "size mismatch");
            continue;
        }
        if start < prefix || end >= total {
            discard(&path, "outside planned span");
            continue;
        }
        completed.insert(
            start,
            Range {
                start,
                end,
                completed: true,
                path,
            },
        );
    }
    Ok(completed)
}

/// Append pending ranges of `chunk_size` covering `[start, max_end]`; the last one is truncated.
fn fill(ranges: &mut Vec<Range>, mut start: u64, max_end: u64, chunk_size: u64, dir: &Path) {
    while start <= max_end {
        let end = start.saturating_add(chunk_size - 1).min(max_end);
        ranges.push(Range::pending(start, end, dir));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
}

fn discard(path: &Path, reason: &str) {
    tracing::debug!(path = %path.display(), reason, "removing stale recovery entry");
    let res = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    if let Err(e) = res {
        tracing::warn!(path = %path.display(), error = %e, "could not remove stale recovery entry");
    }
}
