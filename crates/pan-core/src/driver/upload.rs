use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use super::{Driver, PathFilter, UploadFileReq, UploadPathReq, UploadTarget};
use crate::error::TransferError;
use crate::upload::ChunkedUploadReader;

/// Upload one local file as ordered parts, resuming from the provider's offset.
pub async fn upload_file<D: Driver + ?Sized>(
    driver: &D,
    req: &UploadFileReq,
) -> Result<(), TransferError> {
    let local = &req.local_file;
    let meta = tokio::fs::metadata(local)
        .await
        .map_err(|e| TransferError::storage(format!("stat {}", local.display()), e))?;
    if !meta.is_file() {
        return Err(TransferError::InvalidRequest(format!(
            "{} not a file",
            local.display()
        )));
    }
    let name = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| TransferError::InvalidRequest(format!("{} has no file name", local.display())))?;

    let target = UploadTarget {
        local_file: local.clone(),
        remote_path: req.remote_path.clone(),
        name,
        size: meta.len(),
    };
    let session = driver.begin_upload(&target).await?;
    tracing::info!(
        local = %local.display(),
        remote = %req.remote_path,
        size = target.size,
        part_size = session.part_size,
        uploaded = session.uploaded,
        "start upload file"
    );

    let mut reader = ChunkedUploadReader::open(local, session.part_size, session.uploaded)?;
    let done_parts = session.uploaded / session.part_size;
    let too_many_parts = || {
        TransferError::InvalidRequest(format!(
            "{} needs more than {} parts of {} bytes",
            local.display(),
            u32::MAX,
            session.part_size
        ))
    };
    let mut part_number = u32::try_from(done_parts + 1).map_err(|_| too_many_parts())?;
    u32::try_from(done_parts + reader.remaining_parts()).map_err(|_| too_many_parts())?;
    while !reader.is_finished() {
        let (start, end) = reader.next_chunk();
        let (r, body) = tokio::task::spawn_blocking(move || read_window(reader, end - start)).await??;
        reader = r;
        driver
            .upload_part(&session, part_number, start, end, body)
            .await?;
        tracing::debug!(part = part_number, start, end, "part uploaded");
        part_number = part_number.saturating_add(1);
    }
    driver.finish_upload(&session).await?;
    tracing::info!(local = %local.display(), remote = %req.remote_path, "end upload file");

    if req.success_delete {
        tokio::fs::remove_file(local)
            .await
            .map_err(|e| TransferError::storage(format!("remove {}", local.display()), e))?;
        tracing::info!(local = %local.display(), "deleted after upload");
    }
    Ok(())
}

fn read_window(
    mut reader: ChunkedUploadReader,
    len: u64,
) -> Result<(ChunkedUploadReader, Vec<u8>), TransferError> {
    let mut body = Vec::with_capacity(len as usize);
    reader
        .read_to_end(&mut body)
        .map_err(|e| TransferError::storage(format!("read {}", reader.path().display()), e))?;
    if body.len() as u64 != len {
        return Err(TransferError::storage(
            format!("read {}", reader.path().display()),
            io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank during upload"),
        ));
    }
    Ok((reader, body))
}

/// Upload a file, or a directory tree mirrored under `req.remote_path`.
pub async fn upload_path<D: Driver + ?Sized>(
    driver: &D,
    req: &UploadPathReq,
) -> Result<(), TransferError> {
    let root = &req.local_path;
    if root.as_os_str().is_empty() {
        return Err(TransferError::InvalidRequest("path is empty".into()));
    }
    let meta = tokio::fs::metadata(root)
        .await
        .map_err(|e| TransferError::storage(format!("stat {}", root.display()), e))?;
    if !meta.is_dir() {
        return upload_file(
            driver,
            &UploadFileReq {
                local_file: root.clone(),
                remote_path: req.remote_path.clone(),
                success_delete: req.success_delete,
            },
        )
        .await;
    }

    tracing::info!(local = %root.display(), remote = %req.remote_path, "start upload dir");
    let walk_root = root.clone();
    let filter = req.filter.clone();
    let files = tokio::task::spawn_blocking(move || collect_files(&walk_root, &filter)).await??;

    for file in files {
        let remote = remote_dir(&req.remote_path, root, &file);
        let result = upload_file(
            driver,
            &UploadFileReq {
                local_file: file.clone(),
                remote_path: remote,
                success_delete: req.success_delete,
            },
        )
        .await;
        match result {
            Ok(()) => {
                if req.success_delete {
                    remove_empty_parents(root, &file);
                }
            }
            Err(e) if req.skip_file_err && !e.is_shutdown() => {
                tracing::error!(local = %file.display(), error = %e, "upload failed, continuing");
            }
            Err(e) => return Err(e),
        }
    }
    tracing::info!(local = %root.display(), remote = %req.remote_path, "end upload dir");
    Ok(())
}

/// Files under `root` that pass `filter`, depth first, sorted by name.
fn collect_files(root: &Path, filter: &PathFilter) -> Result<Vec<PathBuf>, TransferError> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = fs::read_dir(&dir)
            .map_err(|e| TransferError::storage(format!("list {}", dir.display()), e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TransferError::storage(format!("list {}", dir.display()), e))?;
        entries.sort_by_key(|e| e.file_name());
        let mut subdirs = Vec::new();
        for entry in entries {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let kind = entry
                .file_type()
                .map_err(|e| TransferError::storage(format!("stat {}", path.display()), e))?;
            if kind.is_dir() {
                if filter.allows_dir(&name) {
                    subdirs.push(path);
                } else {
                    tracing::info!(dir = %path.display(), "dir will skip");
                }
            } else if kind.is_file() && filter.allows_file(&name) {
                files.push(path);
            }
        }
        stack.extend(subdirs.into_iter().rev());
    }
    Ok(files)
}

/// Remote directory for `file`: `remote_root` plus the file's parent relative to `root`.
fn remote_dir(remote_root: &str, root: &Path, file: &Path) -> String {
    let base = remote_root.trim_end_matches('/');
    let rel: Vec<String> = file
        .parent()
        .and_then(|p| p.strip_prefix(root).ok())
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    if rel.is_empty() {
        if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        }
    } else {
        format!("{}/{}", base, rel.join("/"))
    }
}

/// After `file` was deleted, remove its parent directories that are now empty, up to `root`.
fn remove_empty_parents(root: &Path, file: &Path) {
    let mut dir = file.parent();
    while let Some(d) = dir {
        if d == root || !d.starts_with(root) {
            break;
        }
        let empty = fs::read_dir(d).map(|mut it| it.next().is_none()).unwrap_or(false);
        if !empty {
            break;
        }
        match fs::remove_dir(d) {
            Ok(()) => tracing::info!(dir = %d.display(), "deleted empty dir"),
            Err(e) => {
                tracing::warn!(dir = %d.display(), error = %e, "could not remove dir");
                break;
            }
        }
        dir = d.parent();
    }
}
