//! Transport seam: where chunk bytes come from.
//!
//! The engine only needs two things from a transport: the total length of the
//! object and an inclusive byte range streamed into a sink. Implementations are
//! blocking; the engine drives them from `spawn_blocking`.

mod http;
mod parse;

use std::io::Write;

use crate::error::ChunkError;

pub use self::http::{CurlOptions, CurlSource};
pub use parse::{parse_headers, HeaderInfo};

/// A fetchable object that honors inclusive byte-range requests.
pub trait RangeSource: Send + Sync + 'static {
    /// Source locator, used for logging and filename derivation.
    fn locator(&self) -> &str;

    /// Metadata probe (HEAD-equivalent). `Ok(None)` when the length is not advertised.
    fn content_length(&self) -> Result<Option<u64>, ChunkError>;

    /// Stream bytes `start..=end` into `sink`, calling `on_bytes` with every
    /// increment as it arrives. Returns the number of bytes written, which must
    /// equal `end - start + 1` on success.
    fn fetch_range(
        &self,
        start: u64,
        end: u64,
        sink: &mut dyn Write,
        on_bytes: &mut dyn FnMut(u64),
    ) -> Result<u64, ChunkError>;
}
