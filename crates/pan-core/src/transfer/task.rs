use std::path::PathBuf;

use crate::planner::Range;

/// A range while it is being serviced by the worker pool.
///
/// `index` is the position in the ordered partition and drives merge order;
/// it is unrelated to completion order.
#[derive(Debug, Clone)]
pub(crate) struct ChunkTask {
    pub index: usize,
    pub start: u64,
    pub end: u64,
    pub path: PathBuf,
    pub completed: bool,
    pub retries: u32,
}

impl ChunkTask {
    pub fn new(index: usize, range: Range) -> Self {
        Self {
            index,
            start: range.start,
            end: range.end,
            path: range.path,
            completed: range.completed,
            retries: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}
