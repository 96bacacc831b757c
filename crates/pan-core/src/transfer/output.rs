//! Destination resolution for a download.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::TransferError;

/// Name used when neither an output file nor a usable URL segment is available.
const FALLBACK_NAME: &str = "download";

/// Final path: `output_file` if given, else the last non-empty path segment of
/// `locator`, else [`FALLBACK_NAME`]. Relative names are joined to `output_directory`.
pub(crate) fn resolve_path(
    output_file: Option<&Path>,
    output_directory: Option<&Path>,
    locator: &str,
) -> PathBuf {
    let name = match output_file {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(name_from_locator(locator)),
    };
    match output_directory {
        Some(dir) if name.is_relative() => dir.join(name),
        _ => name,
    }
}

fn name_from_locator(locator: &str) -> String {
    let segment = match url::Url::parse(locator) {
        Ok(u) => u
            .path_segments()
            .and_then(|mut s| s.rfind(|seg| !seg.is_empty()).map(str::to_string)),
        Err(_) => Path::new(locator)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
    };
    segment.unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// Create parent directories and open the destination: truncated for a fresh
/// download, append mode when `append` (bytes already present are kept).
pub(crate) fn open_destination(path: &Path, append: bool) -> Result<File, TransferError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| TransferError::storage(format!("create {}", parent.display()), e))?;
    }
    let mut opts = OpenOptions::new();
    opts.create(true);
    if append {
        opts.append(true);
    } else {
        opts.write(true).truncate(true);
    }
    opts.open(path)
        .map_err(|e| TransferError::storage(format!("open {}", path.display()), e))
}
