//! In-memory [`RangeSource`] for engine tests.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ChunkError;
use crate::source::RangeSource;

/// Deterministic test payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailKind {
    /// Half the range is streamed, then the connection "drops".
    Transport,
    /// The chunk file cannot be written.
    Storage,
}

/// Serves `data` from memory with programmable failures and concurrency tracking.
#[derive(Debug)]
pub struct MemorySource {
    locator: String,
    data: Vec<u8>,
    advertised: Option<u64>,
    delay: Duration,
    failures: Mutex<HashMap<u64, (u32, FailKind)>>,
    fetches: Mutex<Vec<(u64, u64)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemorySource {
    pub fn new(locator: &str, data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Self {
            locator: locator.to_string(),
            data,
            advertised: Some(len),
            delay: Duration::ZERO,
            failures: Mutex::new(HashMap::new()),
            fetches: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Length reported by the probe.
    pub fn advertise(mut self, len: Option<u64>) -> Self {
        self.advertised = len;
        self
    }

    /// Sleep this long inside every range request.
    pub fn delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    /// Fail the first `times` requests for the range starting at `start`.
    pub fn fail(self, start: u64, times: u32, kind: FailKind) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(start, (times, kind));
        self
    }

    /// Every requested `(start, end)`, sorted.
    pub fn fetches(&self) -> Vec<(u64, u64)> {
        let mut v = self.fetches.lock().unwrap().clone();
        v.sort();
        v
    }

    pub fn fetch_count(&self, start: u64) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == start)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_failure(&self, start: u64) -> Option<FailKind> {
        let mut failures = self.failures.lock().unwrap();
        let entry = failures.get_mut(&start)?;
        if entry.0 == 0 {
            return None;
        }
        entry.0 -= 1;
        Some(entry.1)
    }
}

impl RangeSource for MemorySource {
    fn locator(&self) -> &str {
        &self.locator
    }

    fn content_length(&self) -> Result<Option<u64>, ChunkError> {
        Ok(self.advertised)
    }

    fn fetch_range(
        &self,
        start: u64,
        end: u64,
        sink: &mut dyn Write,
        on_bytes: &mut dyn FnMut(u64),
    ) -> Result<u64, ChunkError> {
        self.fetches.lock().unwrap().push((start, end));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let result = self.serve(start, end, sink, on_bytes);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl MemorySource {
    fn serve(
        &self,
        start: u64,
        end: u64,
        sink: &mut dyn Write,
        on_bytes: &mut dyn FnMut(u64),
    ) -> Result<u64, ChunkError> {
        let slice = &self.data[start as usize..=end as usize];
        match self.take_failure(start) {
            Some(FailKind::Storage) => {
                return Err(ChunkError::Storage(io::Error::new(
                    io::ErrorKind::Other,
                    "no space left on device",
                )))
            }
            Some(FailKind::Transport) => {
                let half = &slice[..slice.len() / 2];
                sink.write_all(half).map_err(ChunkError::Storage)?;
                on_bytes(half.len() as u64);
                return Err(ChunkError::transport("connection reset by peer"));
            }
            None => {}
        }
        for part in slice.chunks(64 * 1024) {
            sink.write_all(part).map_err(ChunkError::Storage)?;
            on_bytes(part.len() as u64);
        }
        Ok(slice.len() as u64)
    }
}
