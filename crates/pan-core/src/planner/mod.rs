//! Range planning and resume-state recovery.
//!
//! Turns a total size, a chunk size and the contents of a recovery directory
//! into an ordered partition of the object, marking ranges whose chunk files
//! are already complete on disk.

mod manifest;
mod plan;
mod range;

pub use manifest::{reconcile_manifest, Manifest, MANIFEST_FILE};
pub use plan::{plan_ranges, PlanInput};
pub use range::{chunk_file_name, parse_chunk_file_name, Range};
