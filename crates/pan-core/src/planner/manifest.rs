//! Sidecar manifest kept next to the chunk files.
//!
//! Chunk file names stay authoritative for which ranges are committed; the
//! manifest only records what object the directory belongs to so that a
//! directory left behind by a different-sized object is discarded instead of
//! being merged into the new one.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::error::TransferError;

/// Name of the manifest inside a recovery directory.
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Source locator at the time the directory was created (informational).
    pub source: String,
    /// Total object size the chunk files were cut from.
    pub total_size: u64,
}

impl Manifest {
    /// Read the manifest; a missing or unparsable file counts as absent.
    pub fn load(dir: &Path) -> Result<Option<Manifest>, TransferError> {
        let path = dir.join(MANIFEST_FILE);
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TransferError::storage(
                    format!("read {}", path.display()),
                    e,
                ))
            }
        };
        match serde_json::from_slice(&data) {
            Ok(m) => Ok(Some(m)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable manifest");
                Ok(None)
            }
        }
    }

    /// Write the manifest (temp file + rename).
    pub fn store(&self, dir: &Path) -> Result<(), TransferError> {
        let path = dir.join(MANIFEST_FILE);
        let tmp = dir.join(format!("{}.tmp", MANIFEST_FILE));
        let data = serde_json::to_vec_pretty(self).map_err(|e| {
            TransferError::storage("encode manifest", io::Error::new(io::ErrorKind::Other, e))
        })?;
        fs::write(&tmp, data)
            .map_err(|e| TransferError::storage(format!("write {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .map_err(|e| TransferError::storage(format!("rename {}", path.display()), e))?;
        Ok(())
    }
}

/// Make `dir` belong to `manifest`: when a previous manifest declares another
/// total size every other file in the directory is removed first.
pub fn reconcile_manifest(dir: &Path, manifest: &Manifest) -> Result<(), TransferError> {
    if let Some(previous) = Manifest::load(dir)? {
        if previous.total_size != manifest.total_size {
            tracing::warn!(
                dir = %dir.display(),
                previous = previous.total_size,
                current = manifest.total_size,
                "object size changed, discarding recovered chunks"
            );
            clear_chunks(dir)?;
        }
    }
    manifest.store(dir)
}

fn clear_chunks(dir: &Path) -> Result<(), TransferError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| TransferError::storage(format!("list {}", dir.display()), e))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| TransferError::storage(format!("list {}", dir.display()), e))?;
        if entry.file_name() == MANIFEST_FILE {
            continue;
        }
        let path = entry.path();
        fs::remove_file(&path)
            .map_err(|e| TransferError::storage(format!("remove {}", path.display()), e))?;
    }
    Ok(())
}
