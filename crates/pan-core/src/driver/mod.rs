//! Provider boundary.
//!
//! Provider REST clients (auth, listing, multipart upload endpoints) live
//! behind the [`Driver`] trait. The functions here turn driver calls into
//! engine jobs: directory walks with filters, skip-if-present, chunked
//! downloads and strictly ordered multipart uploads.

mod download;
mod filter;
mod upload;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::PanConfig;
use crate::error::TransferError;
use crate::manager::TransferManager;
use crate::retry::RetryPolicy;

pub use download::{download_file, download_file_with, download_path, download_path_with, SourceFactory};
pub use filter::PathFilter;
pub use upload::{upload_file, upload_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    File,
    Dir,
}

/// A file or directory as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    /// Parent path on the remote side.
    pub path: String,
    pub size: u64,
    pub kind: ObjectKind,
}

impl RemoteObject {
    /// `path/name` with surrounding slashes trimmed, for logging.
    pub fn display_path(&self) -> String {
        let parent = self.path.trim_matches('/');
        if parent.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", parent, self.name)
        }
    }
}

/// What a provider needs to start (or resume) a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub local_file: PathBuf,
    pub remote_path: String,
    pub name: String,
    pub size: u64,
}

/// Provider-side multipart upload state.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub id: String,
    /// Part size the provider requires.
    pub part_size: u64,
    /// Bytes already accepted by the provider (resume point).
    pub uploaded: u64,
}

#[async_trait]
pub trait Driver: Send + Sync {
    async fn list(&self, dir: &RemoteObject) -> Result<Vec<RemoteObject>, TransferError>;

    /// Direct (usually signed) URL the file can be range-fetched from.
    async fn download_url(&self, file: &RemoteObject) -> Result<String, TransferError>;

    async fn begin_upload(&self, target: &UploadTarget) -> Result<UploadSession, TransferError>;

    /// Send one part. `part_number` is 1-based; `[start, end)` is its window in the file.
    async fn upload_part(
        &self,
        session: &UploadSession,
        part_number: u32,
        start: u64,
        end: u64,
        body: Vec<u8>,
    ) -> Result<(), TransferError>;

    async fn finish_upload(&self, session: &UploadSession) -> Result<(), TransferError>;
}

/// Called once per file after it is fully on disk: `(directory, file)`, both absolute.
#[derive(Clone)]
pub struct DownloadCallback(Arc<dyn Fn(&Path, &Path) + Send + Sync>);

impl DownloadCallback {
    pub fn new(f: impl Fn(&Path, &Path) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn call(&self, file: &Path) {
        let abs = crate::recovery::absolute_identity(file).unwrap_or_else(|_| file.to_path_buf());
        let dir = abs.parent().map(Path::to_path_buf).unwrap_or_default();
        (self.0)(&dir, &abs);
    }
}

impl fmt::Debug for DownloadCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DownloadCallback")
    }
}

/// Engine settings shared by every driver operation.
#[derive(Debug, Clone)]
pub struct TransferEnv {
    pub manager: TransferManager,
    pub temp_root: PathBuf,
    pub retry: RetryPolicy,
    pub progress_interval: Duration,
}

impl TransferEnv {
    pub fn new(manager: TransferManager, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            manager,
            temp_root: temp_root.into(),
            retry: RetryPolicy::default(),
            progress_interval: Duration::from_secs(1),
        }
    }

    pub fn from_config(cfg: &PanConfig) -> Self {
        Self {
            manager: TransferManager::from_config(&cfg.transfer),
            temp_root: cfg.server.temp_root(),
            retry: cfg.transfer.retry_policy(),
            progress_interval: cfg.transfer.progress_interval(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadFileReq {
    pub remote_file: RemoteObject,
    /// Local directory the file is written into.
    pub local_path: PathBuf,
    pub concurrency: usize,
    pub chunk_size: u64,
    /// Download even when a same-sized local file exists.
    pub overwrite: bool,
    pub callback: Option<DownloadCallback>,
}

#[derive(Debug, Clone)]
pub struct DownloadPathReq {
    pub remote_path: RemoteObject,
    pub local_path: PathBuf,
    pub concurrency: usize,
    pub chunk_size: u64,
    pub overwrite: bool,
    /// Log per-file failures and keep going.
    pub skip_file_err: bool,
    pub filter: PathFilter,
    pub callback: Option<DownloadCallback>,
}

#[derive(Debug, Clone)]
pub struct UploadFileReq {
    pub local_file: PathBuf,
    pub remote_path: String,
    /// Remove the local file once the provider accepted it.
    pub success_delete: bool,
}

#[derive(Debug, Clone)]
pub struct UploadPathReq {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub skip_file_err: bool,
    /// Remove uploaded files, and directories they leave empty.
    pub success_delete: bool,
    pub filter: PathFilter,
}

#[cfg(test)]
pub(crate) mod fake;
