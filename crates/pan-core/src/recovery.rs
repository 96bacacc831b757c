//! Recovery directory naming and lifecycle.
//!
//! Each job owns one directory under the recovery root, named by the SHA-256
//! of its identity (the absolute destination path, or the source URL when the
//! destination is a caller-supplied writer). Its chunk files are the only
//! state needed to resume. One job per identity at a time.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::TransferError;

/// Lowercase hex SHA-256 of `identity`.
pub fn identity_hash(identity: &str) -> String {
    hex::encode(Sha256::digest(identity.as_bytes()))
}

/// Absolute form of `path` without touching the filesystem.
pub fn absolute_identity(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

/// Directory for `identity` under `root`.
pub fn recovery_dir(root: &Path, identity: &str) -> PathBuf {
    root.join(identity_hash(identity))
}

/// Create the directory (and parents) if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), TransferError> {
    fs::create_dir_all(dir)
        .map_err(|e| TransferError::storage(format!("create {}", dir.display()), e))
}

/// Remove the directory after a successful merge. Already gone is fine.
pub fn remove_dir(dir: &Path) -> Result<(), TransferError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TransferError::storage(
            format!("remove {}", dir.display()),
            e,
        )),
    }
}
