use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::{DownloadFileReq, DownloadPathReq, Driver, ObjectKind, TransferEnv};
use crate::error::TransferError;
use crate::source::{CurlSource, RangeSource};
use crate::transfer::ChunkDownload;

/// Builds the transport for a resolved download URL.
pub type SourceFactory = dyn Fn(String) -> Arc<dyn RangeSource> + Send + Sync;

fn curl_source(url: String) -> Arc<dyn RangeSource> {
    Arc::new(CurlSource::new(url))
}

/// Download one remote file into `req.local_path` over libcurl.
pub async fn download_file<D: Driver + ?Sized>(
    driver: &D,
    env: &TransferEnv,
    req: &DownloadFileReq,
) -> Result<(), TransferError> {
    download_file_with(driver, env, req, &curl_source).await
}

/// [`download_file`] with a caller-supplied transport.
pub async fn download_file_with<D: Driver + ?Sized>(
    driver: &D,
    env: &TransferEnv,
    req: &DownloadFileReq,
    make_source: &SourceFactory,
) -> Result<(), TransferError> {
    let file = &req.remote_file;
    if file.kind != ObjectKind::File {
        return Err(TransferError::InvalidRequest("only support download file".into()));
    }
    let remote = file.display_path();
    let output = req.local_path.join(&file.name);
    tracing::info!(remote = %remote, local = %output.display(), "start download file");

    if !req.overwrite {
        if let Ok(meta) = tokio::fs::metadata(&output).await {
            if meta.is_file() && meta.len() == file.size {
                tracing::info!(remote = %remote, "same size file exists, skipping");
                if let Some(cb) = &req.callback {
                    cb.call(&output);
                }
                return Ok(());
            }
        }
    }

    let url = driver.download_url(file).await?;
    let result = ChunkDownload::from_arc(make_source(url), env.manager.clone())
        .file_size(file.size)
        .chunk_size(req.chunk_size)
        .concurrency(req.concurrency)
        .retry_policy(env.retry)
        .temp_root(&env.temp_root)
        .progress_interval(env.progress_interval)
        .output_file(&output)
        .run()
        .await;
    if let Err(e) = result {
        tracing::error!(remote = %remote, error = %e, "error download file");
        return Err(e);
    }

    tracing::info!(remote = %remote, local = %output.display(), "end download file");
    if let Some(cb) = &req.callback {
        cb.call(&output);
    }
    Ok(())
}

/// Download a remote directory tree into `req.local_path` over libcurl.
pub async fn download_path<D: Driver + ?Sized>(
    driver: &D,
    env: &TransferEnv,
    req: &DownloadPathReq,
) -> Result<(), TransferError> {
    download_path_with(driver, env, req, &curl_source).await
}

/// [`download_path`] with a caller-supplied transport.
pub fn download_path_with<'a, D: Driver + ?Sized>(
    driver: &'a D,
    env: &'a TransferEnv,
    req: &'a DownloadPathReq,
    make_source: &'a SourceFactory,
) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + 'a>> {
    Box::pin(async move {
        let dir = &req.remote_path;
        if dir.kind != ObjectKind::Dir {
            return Err(TransferError::InvalidRequest("only support download dir".into()));
        }
        let remote = dir.display_path();
        tracing::info!(remote = %remote, local = %req.local_path.display(), "start download dir");

        for object in driver.list(dir).await? {
            let result = match object.kind {
                ObjectKind::Dir => {
                    if !req.filter.allows_dir(&object.name) {
                        tracing::info!(name = %object.name, "dir will skip");
                        continue;
                    }
                    let sub = DownloadPathReq {
                        remote_path: object.clone(),
                        local_path: req.local_path.join(&object.name),
                        ..req.clone()
                    };
                    download_path_with(driver, env, &sub, make_source).await
                }
                ObjectKind::File => {
                    if !req.filter.allows_file(&object.name) {
                        tracing::info!(name = %object.name, "file will skip");
                        continue;
                    }
                    let file = DownloadFileReq {
                        remote_file: object.clone(),
                        local_path: req.local_path.clone(),
                        concurrency: req.concurrency,
                        chunk_size: req.chunk_size,
                        overwrite: req.overwrite,
                        callback: req.callback.clone(),
                    };
                    download_file_with(driver, env, &file, make_source).await
                }
            };
            if let Err(e) = result {
                if req.skip_file_err && !e.is_shutdown() {
                    tracing::error!(name = %object.name, error = %e, "download failed, continuing");
                } else {
                    return Err(e);
                }
            }
        }

        tracing::info!(remote = %remote, local = %req.local_path.display(), "end download dir");
        Ok(())
    })
}
