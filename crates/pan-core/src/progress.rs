//! Progress reporting for transfers (bytes done, ETA, rate).
//!
//! Workers feed byte counts into a shared [`ProgressReporter`] as bodies stream;
//! the reporter turns them into periodic throughput logs. Bytes recovered from
//! disk count toward completion but not toward throughput.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Snapshot of progress for one transfer.
#[derive(Debug, Clone)]
pub struct ProgressStats {
    /// Bytes present so far, resumed plus transferred.
    pub bytes_done: u64,
    /// Bytes transferred by this run only.
    pub bytes_this_run: u64,
    /// Total object size in bytes.
    pub total_bytes: u64,
    /// Elapsed time since the reporter was created (seconds).
    pub elapsed_secs: f64,
}

impl ProgressStats {
    /// Rate of this run in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_this_run as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if rate is 0 and work remains).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}

/// `"<rate> KiB/s"` for `bytes` moved over `elapsed`.
pub fn format_throughput(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 { bytes as f64 / secs / 1024.0 } else { 0.0 };
    format!("{:.2} KiB/s", rate)
}

/// Thread-safe byte counter for one named transfer.
#[derive(Debug)]
pub struct ProgressReporter {
    name: String,
    total: u64,
    interval: Duration,
    started: Instant,
    resumed: AtomicU64,
    transferred: AtomicU64,
    last_log: Mutex<Instant>,
    finished: AtomicBool,
}

impl ProgressReporter {
    pub fn new(name: impl Into<String>, total: u64, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            total,
            interval,
            started: now,
            resumed: AtomicU64::new(0),
            transferred: AtomicU64::new(0),
            last_log: Mutex::new(now),
            finished: AtomicBool::new(false),
        }
    }

    /// Bytes already on disk from an earlier attempt.
    pub fn record_resumed(&self, bytes: u64) {
        self.resumed.fetch_add(bytes, Ordering::Relaxed);
        self.maybe_log();
    }

    /// Bytes received over the network in this run.
    pub fn record_transferred(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::Relaxed);
        self.maybe_log();
    }

    /// Take back bytes of a failed attempt; the range is fetched again from scratch.
    pub fn rewind(&self, bytes: u64) {
        let _ = self
            .transferred
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(bytes))
            });
    }

    pub fn snapshot(&self) -> ProgressStats {
        let resumed = self.resumed.load(Ordering::Relaxed);
        let transferred = self.transferred.load(Ordering::Relaxed);
        ProgressStats {
            bytes_done: resumed + transferred,
            bytes_this_run: transferred,
            total_bytes: self.total,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        }
    }

    fn maybe_log(&self) {
        let stats = self.snapshot();
        if stats.bytes_done >= self.total {
            if !self.finished.swap(true, Ordering::Relaxed) {
                tracing::info!(
                    name = %self.name,
                    bytes = stats.bytes_done,
                    resumed = stats.bytes_done - stats.bytes_this_run,
                    "{}: done, {}, {:.1}s",
                    self.name,
                    format_throughput(stats.bytes_this_run, self.started.elapsed()),
                    stats.elapsed_secs
                );
            }
            return;
        }

        let mut last = self.last_log.lock().unwrap_or_else(|e| e.into_inner());
        if last.elapsed() < self.interval {
            return;
        }
        *last = Instant::now();
        drop(last);
        tracing::debug!(
            name = %self.name,
            bytes = stats.bytes_done,
            total = self.total,
            "{}: {:.1}%, {}, {:.1}s",
            self.name,
            stats.fraction() * 100.0,
            format_throughput(stats.bytes_this_run, self.started.elapsed()),
            stats.elapsed_secs
        );
    }
}
