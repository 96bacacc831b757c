//! Worker pool: dequeue ranges, fetch them into chunk files, requeue failures.

use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::task::ChunkTask;
use crate::admission::AdmissionController;
use crate::error::{ChunkError, TransferError};
use crate::planner::Range;
use crate::progress::ProgressReporter;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::source::RangeSource;

/// Everything the planner, workers and retry timers of one job share.
pub(crate) struct JobContext {
    pub job: u64,
    pub source: Arc<dyn RangeSource>,
    pub admission: AdmissionController,
    pub retry: RetryPolicy,
    pub progress: Arc<ProgressReporter>,
    /// Manager shutdown.
    pub shutdown: CancellationToken,
    /// Job finished (either way); child of `shutdown`.
    pub done: CancellationToken,
    pub queue: mpsc::Sender<ChunkTask>,
    pub completed: mpsc::UnboundedSender<ChunkTask>,
    pub errors: mpsc::UnboundedSender<TransferError>,
}

impl JobContext {
    fn fail(&self, err: TransferError) {
        let _ = self.errors.send(err);
    }

    fn complete(&self, task: ChunkTask) {
        let _ = self.completed.send(task);
    }
}

pub(crate) type SharedQueue = Arc<Mutex<mpsc::Receiver<ChunkTask>>>;

/// Stream the plan into the work queue, checking for shutdown before each task.
pub(crate) async fn emit_plan(ctx: Arc<JobContext>, ranges: Vec<Range>) {
    for (index, range) in ranges.into_iter().enumerate() {
        if ctx.shutdown.is_cancelled() {
            tracing::debug!(job = ctx.job, index, "planner stopped by shutdown");
            ctx.fail(TransferError::Shutdown);
            return;
        }
        let task = ChunkTask::new(index, range);
        tokio::select! {
            biased;
            _ = ctx.done.cancelled() => return,
            sent = ctx.queue.send(task) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

pub(crate) async fn run_worker(ctx: Arc<JobContext>, queue: SharedQueue, worker: usize) {
    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => {
                tracing::debug!(job = ctx.job, worker, "worker stopped by shutdown");
                ctx.fail(TransferError::Shutdown);
                return;
            }
            _ = ctx.done.cancelled() => return,
            task = async { queue.lock().await.recv().await } => task,
        };
        let Some(mut task) = next else { return };

        if task.completed {
            ctx.progress.record_resumed(task.len());
            ctx.complete(task);
            continue;
        }

        let slot = tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => {
                tracing::debug!(job = ctx.job, worker, index = task.index, "admission wait stopped by shutdown");
                ctx.fail(TransferError::Shutdown);
                return;
            }
            _ = ctx.done.cancelled() => return,
            slot = ctx.admission.acquire() => match slot {
                Ok(slot) => slot,
                Err(e) => {
                    ctx.fail(e);
                    return;
                }
            },
        };
        let attempt = fetch_chunk(&ctx, &task).await;
        drop(slot);

        let (result, streamed) = match attempt {
            Ok(r) => r,
            Err(e) => {
                ctx.fail(e);
                return;
            }
        };
        match result {
            Ok(bytes) => {
                tracing::debug!(
                    job = ctx.job,
                    worker,
                    index = task.index,
                    start = task.start,
                    end = task.end,
                    bytes,
                    "chunk fetched"
                );
                task.completed = true;
                ctx.complete(task);
            }
            Err(err) if err.is_retryable() => {
                ctx.progress.rewind(streamed);
                task.retries += 1;
                match ctx.retry.decide(task.retries) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::warn!(
                            job = ctx.job,
                            index = task.index,
                            attempt = task.retries,
                            error = %err,
                            "chunk failed, requeueing"
                        );
                        requeue(&ctx, task, delay);
                    }
                    RetryDecision::NoRetry => {
                        ctx.fail(TransferError::RetriesExhausted {
                            index: task.index,
                            start: task.start,
                            end: task.end,
                            attempts: task.retries,
                            source: err,
                        });
                        return;
                    }
                }
            }
            Err(err) => {
                ctx.fail(TransferError::Chunk {
                    index: task.index,
                    source: err,
                });
                return;
            }
        }
    }
}

/// Truncate the chunk file and stream the range into it on a blocking thread.
/// Returns the transport outcome plus the bytes reported to progress meanwhile.
async fn fetch_chunk(
    ctx: &Arc<JobContext>,
    task: &ChunkTask,
) -> Result<(Result<u64, ChunkError>, u64), TransferError> {
    let file = match tokio::fs::File::create(&task.path).await {
        Ok(f) => f.into_std().await,
        Err(e) => return Ok((Err(ChunkError::Storage(e)), 0)),
    };
    let source = Arc::clone(&ctx.source);
    let progress = Arc::clone(&ctx.progress);
    let (start, end) = (task.start, task.end);

    let joined = tokio::task::spawn_blocking(move || {
        let mut streamed = 0u64;
        let mut sink = BufWriter::new(file);
        let mut on_bytes = |n: u64| {
            streamed += n;
            progress.record_transferred(n);
        };
        let result = source
            .fetch_range(start, end, &mut sink, &mut on_bytes)
            .and_then(|n| {
                sink.flush().map_err(ChunkError::Storage)?;
                Ok(n)
            });
        (result, streamed)
    })
    .await?;
    Ok(joined)
}

/// Put `task` back on the queue without blocking the worker.
fn requeue(ctx: &Arc<JobContext>, task: ChunkTask, delay: Duration) {
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::select! {
                _ = ctx.done.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tokio::select! {
            _ = ctx.done.cancelled() => {}
            _ = ctx.queue.send(task) => {}
        }
    });
}
