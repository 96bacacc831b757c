//! Process-wide transfer state: admission pool, running-job registry, shutdown.
//!
//! A `TransferManager` is created once and cloned into every job. Jobs register
//! on start and deregister when their [`JobGuard`] drops; `shutdown` cancels the
//! root token and waits until the registry is empty.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::admission::AdmissionController;
use crate::config::TransferConfig;
use crate::error::TransferError;

pub type JobId = u64;

#[derive(Debug)]
struct RunningJob {
    label: String,
    started: Instant,
}

#[derive(Debug)]
struct Inner {
    admission: AdmissionController,
    root: CancellationToken,
    jobs: Mutex<HashMap<JobId, RunningJob>>,
    next_id: AtomicU64,
    drained: Notify,
}

/// Shared handle; cheap to clone.
#[derive(Debug, Clone)]
pub struct TransferManager {
    inner: Arc<Inner>,
}

impl TransferManager {
    /// `capacity` is the admission limit across all jobs (0 is treated as 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                admission: AdmissionController::new(capacity),
                root: CancellationToken::new(),
                jobs: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                drained: Notify::new(),
            }),
        }
    }

    pub fn from_config(cfg: &TransferConfig) -> Self {
        Self::new(cfg.max_parallel_transfers)
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.inner.admission
    }

    /// Register a job. Refused once shutdown has started.
    pub fn register(&self, label: impl Into<String>) -> Result<JobGuard, TransferError> {
        let mut jobs = self.lock_jobs();
        if self.inner.root.is_cancelled() {
            return Err(TransferError::Shutdown);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let label = label.into();
        tracing::debug!(job = id, label = %label, "job registered");
        jobs.insert(
            id,
            RunningJob {
                label,
                started: Instant::now(),
            },
        );
        Ok(JobGuard {
            id,
            token: self.inner.root.child_token(),
            manager: self.clone(),
        })
    }

    pub fn running_jobs(&self) -> usize {
        self.lock_jobs().len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.root.is_cancelled()
    }

    /// Cancel every job and wait until all of them have deregistered.
    pub async fn shutdown(&self) {
        self.inner.root.cancel();
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let jobs = self.lock_jobs();
                if jobs.is_empty() {
                    break;
                }
                for (id, job) in jobs.iter() {
                    tracing::info!(
                        job = id,
                        label = %job.label,
                        running_secs = job.started.elapsed().as_secs(),
                        "waiting for job to stop"
                    );
                }
            }
            notified.await;
        }
        tracing::info!("transfer manager stopped");
    }

    /// [`shutdown`](Self::shutdown) bounded by `timeout`. Returns true when all jobs drained.
    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.shutdown()).await.is_ok()
    }

    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, RunningJob>> {
        self.inner.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn deregister(&self, id: JobId) {
        let mut jobs = self.lock_jobs();
        jobs.remove(&id);
        tracing::debug!(job = id, "job deregistered");
        if jobs.is_empty() {
            self.inner.drained.notify_waiters();
        }
    }
}

/// Registration of one running job; deregisters on drop.
#[derive(Debug)]
pub struct JobGuard {
    id: JobId,
    token: CancellationToken,
    manager: TransferManager,
}

impl JobGuard {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Cancelled when the manager shuts down.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.manager.deregister(self.id);
    }
}
