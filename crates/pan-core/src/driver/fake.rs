//! In-memory [`Driver`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Driver, ObjectKind, RemoteObject, UploadSession, UploadTarget};
use crate::error::TransferError;

pub fn file(id: &str, path: &str, name: &str, size: u64) -> RemoteObject {
    RemoteObject {
        id: id.to_string(),
        name: name.to_string(),
        path: path.to_string(),
        size,
        kind: ObjectKind::File,
    }
}

pub fn dir(id: &str, path: &str, name: &str) -> RemoteObject {
    RemoteObject {
        id: id.to_string(),
        name: name.to_string(),
        path: path.to_string(),
        size: 0,
        kind: ObjectKind::Dir,
    }
}

/// One uploaded part as the provider saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub remote: String,
    pub number: u32,
    pub start: u64,
    pub end: u64,
    pub body: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct FakeDriver {
    children: HashMap<String, Vec<RemoteObject>>,
    failing_urls: Vec<String>,
    part_size: u64,
    /// Resume points by remote file path.
    resume: HashMap<String, u64>,
    failing_uploads: Vec<String>,
    url_requests: Mutex<usize>,
    parts: Mutex<Vec<Part>>,
    finished: Mutex<Vec<String>>,
}

impl FakeDriver {
    pub fn with_children(mut self, parent: &RemoteObject, children: Vec<RemoteObject>) -> Self {
        self.children.insert(parent.id.clone(), children);
        self
    }

    pub fn fail_url(mut self, id: &str) -> Self {
        self.failing_urls.push(id.to_string());
        self
    }

    pub fn part_size(mut self, size: u64) -> Self {
        self.part_size = size;
        self
    }

    pub fn resume_at(mut self, remote: &str, uploaded: u64) -> Self {
        self.resume.insert(remote.to_string(), uploaded);
        self
    }

    pub fn fail_upload(mut self, name: &str) -> Self {
        self.failing_uploads.push(name.to_string());
        self
    }

    pub fn url_requests(&self) -> usize {
        *self.url_requests.lock().unwrap()
    }

    pub fn parts(&self) -> Vec<Part> {
        self.parts.lock().unwrap().clone()
    }

    /// Remote files whose upload was finished, in order.
    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

fn remote_file(target: &UploadTarget) -> String {
    format!("{}/{}", target.remote_path.trim_end_matches('/'), target.name)
}

#[async_trait]
impl Driver for FakeDriver {
    async fn list(&self, dir: &RemoteObject) -> Result<Vec<RemoteObject>, TransferError> {
        Ok(self.children.get(&dir.id).cloned().unwrap_or_default())
    }

    async fn download_url(&self, file: &RemoteObject) -> Result<String, TransferError> {
        *self.url_requests.lock().unwrap() += 1;
        if self.failing_urls.contains(&file.id) {
            return Err(TransferError::Driver(format!("no link for {}", file.name)));
        }
        Ok(format!("mem://{}", file.id))
    }

    async fn begin_upload(&self, target: &UploadTarget) -> Result<UploadSession, TransferError> {
        if self.failing_uploads.contains(&target.name) {
            return Err(TransferError::Driver(format!("quota exceeded for {}", target.name)));
        }
        let id = remote_file(target);
        Ok(UploadSession {
            uploaded: self.resume.get(&id).copied().unwrap_or(0),
            part_size: if self.part_size == 0 { 4 } else { self.part_size },
            id,
        })
    }

    async fn upload_part(
        &self,
        session: &UploadSession,
        part_number: u32,
        start: u64,
        end: u64,
        body: Vec<u8>,
    ) -> Result<(), TransferError> {
        self.parts.lock().unwrap().push(Part {
            remote: session.id.clone(),
            number: part_number,
            start,
            end,
            body,
        });
        Ok(())
    }

    async fn finish_upload(&self, session: &UploadSession) -> Result<(), TransferError> {
        self.finished.lock().unwrap().push(session.id.clone());
        Ok(())
    }
}
