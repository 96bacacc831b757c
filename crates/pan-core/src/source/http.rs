//! libcurl-backed [`RangeSource`].

use std::cell::RefCell;
use std::io::{self, Write};
use std::time::Duration;

use curl::easy::{Easy, List};

use super::parse::parse_headers;
use super::RangeSource;
use crate::error::ChunkError;

/// Per-request transport limits.
#[derive(Debug, Clone)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Abort when throughput stays below `low_speed_limit` bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    /// Hard wall-clock cap for one request.
    pub timeout: Duration,
    pub max_redirections: u32,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            timeout: Duration::from_secs(3600),
            max_redirections: 10,
        }
    }
}

/// HTTP(S) object fetched with one libcurl easy handle per request.
#[derive(Debug, Clone)]
pub struct CurlSource {
    url: String,
    headers: Vec<(String, String)>,
    options: CurlOptions,
}

/// What to do with the body once the status line is known.
#[derive(Clone, Copy)]
enum BodyMode {
    Write(u32),
    Discard,
    Reject(u32),
}

impl CurlSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            options: CurlOptions::default(),
        }
    }

    /// Extra request header sent with every probe and range request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn options(mut self, options: CurlOptions) -> Self {
        self.options = options;
        self
    }

    fn easy(&self) -> Result<Easy, ChunkError> {
        let mut easy = Easy::new();
        easy.url(&self.url).map_err(ChunkError::transport)?;
        easy.follow_location(true).map_err(ChunkError::transport)?;
        easy.max_redirections(self.options.max_redirections)
            .map_err(ChunkError::transport)?;
        easy.connect_timeout(self.options.connect_timeout)
            .map_err(ChunkError::transport)?;
        easy.low_speed_limit(self.options.low_speed_limit)
            .map_err(ChunkError::transport)?;
        easy.low_speed_time(self.options.low_speed_time)
            .map_err(ChunkError::transport)?;
        easy.timeout(self.options.timeout)
            .map_err(ChunkError::transport)?;

        if !self.headers.is_empty() {
            let mut list = List::new();
            for (k, v) in &self.headers {
                list.append(&format!("{}: {}", k.trim(), v.trim()))
                    .map_err(ChunkError::transport)?;
            }
            easy.http_headers(list).map_err(ChunkError::transport)?;
        }
        Ok(easy)
    }
}

fn push_header_line(lines: &mut Vec<String>, data: &[u8]) {
    if let Ok(s) = std::str::from_utf8(data) {
        let s = s.trim_end();
        if !s.is_empty() {
            lines.push(s.to_string());
        }
    }
}

impl RangeSource for CurlSource {
    fn locator(&self) -> &str {
        &self.url
    }

    fn content_length(&self) -> Result<Option<u64>, ChunkError> {
        let mut easy = self.easy()?;
        easy.nobody(true).map_err(ChunkError::transport)?;

        let mut lines = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    push_header_line(&mut lines, data);
                    true
                })
                .map_err(ChunkError::transport)?;
            transfer.perform().map_err(ChunkError::transport)?;
        }

        let code = easy.response_code().map_err(ChunkError::transport)?;
        if !(200..300).contains(&code) {
            return Err(ChunkError::Http(code));
        }
        let info = parse_headers(&lines);
        tracing::debug!(
            url = %self.url,
            content_length = ?info.content_length,
            accept_ranges = info.accept_ranges,
            "probe"
        );
        Ok(info.content_length)
    }

    fn fetch_range(
        &self,
        start: u64,
        end: u64,
        sink: &mut dyn Write,
        on_bytes: &mut dyn FnMut(u64),
    ) -> Result<u64, ChunkError> {
        let expected = end - start + 1;
        let mut easy = self.easy()?;
        easy.range(&format!("{}-{}", start, end))
            .map_err(ChunkError::transport)?;

        let lines = RefCell::new(Vec::new());
        let mut mode: Option<BodyMode> = None;
        let mut written = 0u64;
        let mut storage_error: Option<io::Error> = None;

        let perform_result = {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    push_header_line(&mut lines.borrow_mut(), data);
                    true
                })
                .map_err(ChunkError::transport)?;
            transfer
                .write_function(|data| {
                    let current = *mode.get_or_insert_with(|| {
                        match parse_headers(&lines.borrow()).status {
                            Some(206) => BodyMode::Write(206),
                            Some(200) if start == 0 => BodyMode::Write(200),
                            Some(code) if (200..300).contains(&code) => BodyMode::Reject(code),
                            // Error pages are drained and reported from the status code.
                            _ => BodyMode::Discard,
                        }
                    });
                    match current {
                        BodyMode::Discard => Ok(data.len()),
                        BodyMode::Reject(_) => Ok(0),
                        BodyMode::Write(code) => {
                            let n = data.len() as u64;
                            if written + n > expected {
                                mode = Some(BodyMode::Reject(code));
                                return Ok(0);
                            }
                            match sink.write_all(data) {
                                Ok(()) => {
                                    written += n;
                                    on_bytes(n);
                                    Ok(data.len())
                                }
                                Err(e) => {
                                    storage_error = Some(e);
                                    Ok(0)
                                }
                            }
                        }
                    }
                })
                .map_err(ChunkError::transport)?;
            transfer.perform()
        };

        if let Err(e) = perform_result {
            if e.is_write_error() {
                if let Some(io_err) = storage_error {
                    return Err(ChunkError::Storage(io_err));
                }
                if let Some(BodyMode::Reject(code)) = mode {
                    return Err(ChunkError::InvalidRangeResponse(code));
                }
            }
            return Err(ChunkError::transport(e));
        }

        let code = easy.response_code().map_err(ChunkError::transport)?;
        if !(200..300).contains(&code) {
            return Err(ChunkError::Http(code));
        }
        if written != expected {
            return Err(ChunkError::PartialTransfer {
                expected,
                received: written,
            });
        }
        sink.flush().map_err(ChunkError::Storage)?;
        Ok(written)
    }
}
