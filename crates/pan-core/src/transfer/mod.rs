//! One chunked download job.
//!
//! [`ChunkDownload`] probes the size if needed, plans ranges from the recovery
//! directory, then runs a planner task, a pool of workers and an in-order
//! merger until the destination is complete or the first fatal error arrives.

mod merge;
mod output;
mod task;
mod worker;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::TransferError;
use crate::manager::TransferManager;
use crate::planner::{plan_ranges, reconcile_manifest, Manifest, PlanInput};
use crate::progress::ProgressReporter;
use crate::recovery;
use crate::retry::RetryPolicy;
use crate::source::RangeSource;

use self::merge::merge_chunks;
use self::worker::{emit_plan, run_worker, JobContext};

/// Result of a successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Destination file; `None` when an explicit writer was supplied.
    pub path: Option<PathBuf>,
    /// Total object size.
    pub total_bytes: u64,
    /// Bytes appended to the destination by this run.
    pub merged_bytes: u64,
    /// Bytes fetched over the network by this run.
    pub transferred_bytes: u64,
    /// Bytes reused from chunk files left by an earlier attempt.
    pub resumed_bytes: u64,
}

/// Builder and runner for one source → destination transfer.
pub struct ChunkDownload {
    source: Arc<dyn RangeSource>,
    manager: TransferManager,
    file_size: Option<u64>,
    chunk_size: u64,
    concurrency: usize,
    retry: RetryPolicy,
    temp_root: PathBuf,
    output_file: Option<PathBuf>,
    output_directory: Option<PathBuf>,
    output: Option<Box<dyn Write + Send>>,
    written_prefix: u64,
    identity: Option<String>,
    progress_interval: Duration,
}

impl ChunkDownload {
    pub fn new<S: RangeSource>(source: S, manager: TransferManager) -> Self {
        Self::from_arc(Arc::new(source), manager)
    }

    pub fn from_arc(source: Arc<dyn RangeSource>, manager: TransferManager) -> Self {
        Self {
            source,
            manager,
            file_size: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: 1,
            retry: RetryPolicy::default(),
            temp_root: std::env::temp_dir(),
            output_file: None,
            output_directory: None,
            output: None,
            written_prefix: 0,
            identity: None,
            progress_interval: Duration::from_secs(1),
        }
    }

    /// Known object size; 0 means unknown and triggers a probe.
    pub fn file_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }

    /// Bytes per range; 0 selects the default.
    pub fn chunk_size(mut self, size: u64) -> Self {
        self.chunk_size = size;
        self
    }

    /// Workers for this job; 0 is treated as 1.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Root under which the recovery directory is created.
    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = root.into();
        self
    }

    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(dir.into());
        self
    }

    /// Write into `w` instead of a file. Takes precedence over the output path.
    pub fn output<W: Write + Send + 'static>(mut self, w: W) -> Self {
        self.output = Some(Box::new(w));
        self
    }

    /// Bytes the destination already holds; the file is opened in append mode
    /// and only `[prefix, total)` is planned.
    pub fn written_prefix(mut self, prefix: u64) -> Self {
        self.written_prefix = prefix;
        self
    }

    /// Override the key the recovery directory is named after.
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Run the job to completion, or to the first fatal error.
    ///
    /// On failure the chunk files stay in the recovery directory so a later run
    /// with the same destination resumes from them.
    pub async fn run(self) -> Result<TransferOutcome, TransferError> {
        let guard = self.manager.register(self.source.locator())?;
        let job = guard.id();
        let shutdown = guard.token().clone();

        let total = match self.file_size {
            Some(n) if n > 0 => n,
            _ => probe_size(&self.source).await?,
        };

        let (sink, path) = match self.output {
            Some(w) => (w, None),
            None => {
                let path = output::resolve_path(
                    self.output_file.as_deref(),
                    self.output_directory.as_deref(),
                    self.source.locator(),
                );
                let file = output::open_destination(&path, self.written_prefix > 0)?;
                (Box::new(file) as merge::Sink, Some(path))
            }
        };

        let identity = match (&self.identity, &path) {
            (Some(id), _) => id.clone(),
            (None, Some(p)) => identity_of(p)?,
            (None, None) => self.source.locator().to_string(),
        };
        let dir = recovery::recovery_dir(&self.temp_root, &identity);
        let plan_input = PlanInput {
            dir: dir.clone(),
            total,
            chunk_size: self.chunk_size,
            written_prefix: self.written_prefix,
        };
        let manifest = Manifest {
            source: self.source.locator().to_string(),
            total_size: total,
        };
        let ranges = tokio::task::spawn_blocking(move || {
            recovery::ensure_dir(&plan_input.dir)?;
            reconcile_manifest(&plan_input.dir, &manifest)?;
            plan_ranges(&plan_input)
        })
        .await??;

        let count = ranges.len();
        let concurrency = self.concurrency.max(1);
        let name = path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.locator().to_string());
        let progress = Arc::new(ProgressReporter::new(name, total, self.progress_interval));
        progress.record_resumed(self.written_prefix.min(total));

        tracing::info!(
            job,
            source = %self.source.locator(),
            total,
            ranges = count,
            concurrency,
            dir = %dir.display(),
            "download started"
        );

        let done = shutdown.child_token();
        let (queue_tx, queue_rx) = mpsc::channel(concurrency * 2);
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();
        let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(JobContext {
            job,
            source: Arc::clone(&self.source),
            admission: self.manager.admission().clone(),
            retry: self.retry,
            progress: Arc::clone(&progress),
            shutdown: shutdown.clone(),
            done: done.clone(),
            queue: queue_tx,
            completed: completed_tx,
            errors: errors_tx,
        });

        let mut merger = tokio::spawn(merge_chunks(sink, completed_rx, count, dir, done.clone()));
        let queue = Arc::new(Mutex::new(queue_rx));
        let mut tasks = Vec::with_capacity(concurrency + 1);
        for worker in 0..concurrency {
            tasks.push(tokio::spawn(run_worker(
                Arc::clone(&ctx),
                Arc::clone(&queue),
                worker,
            )));
        }
        tasks.push(tokio::spawn(emit_plan(ctx, ranges)));

        let result = tokio::select! {
            merged = &mut merger => merged.map_err(TransferError::from).and_then(|r| r),
            Some(err) = errors_rx.recv() => {
                done.cancel();
                let _ = (&mut merger).await;
                Err(err)
            }
        };

        done.cancel();
        for t in tasks {
            let _ = t.await;
        }
        drop(guard);

        match result {
            Ok(merged_bytes) => {
                let stats = progress.snapshot();
                tracing::info!(job, total, merged_bytes, "download finished");
                Ok(TransferOutcome {
                    path,
                    total_bytes: total,
                    merged_bytes,
                    transferred_bytes: stats.bytes_this_run,
                    resumed_bytes: stats.bytes_done - stats.bytes_this_run,
                })
            }
            Err(e) => {
                if e.is_shutdown() {
                    tracing::info!(job, "download interrupted by shutdown");
                } else {
                    tracing::error!(job, error = %e, "download failed");
                }
                Err(e)
            }
        }
    }
}

async fn probe_size(source: &Arc<dyn RangeSource>) -> Result<u64, TransferError> {
    let s = Arc::clone(source);
    let len = tokio::task::spawn_blocking(move || s.content_length())
        .await?
        .map_err(TransferError::Probe)?;
    match len {
        Some(n) if n > 0 => Ok(n),
        Some(n) => Err(TransferError::SizeUnknown(format!("bad content length: {}", n))),
        None => Err(TransferError::SizeUnknown(format!(
            "{} did not report a content length",
            source.locator()
        ))),
    }
}

fn identity_of(path: &Path) -> Result<String, TransferError> {
    let abs = recovery::absolute_identity(path)
        .map_err(|e| TransferError::storage("resolve current directory", e))?;
    Ok(abs.to_string_lossy().into_owned())
}
