//! Parse HTTP response header lines collected by libcurl.

/// Key facts from one response's headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderInfo {
    /// Status code from the last `HTTP/` status line.
    pub status: Option<u32>,
    /// `Content-Length`, if present and numeric.
    pub content_length: Option<u64>,
    /// True if the server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
    /// `(start, end)` from `Content-Range: bytes start-end/total`.
    pub content_range: Option<(u64, u64)>,
}

/// Parse header lines. Only the last response counts: each `HTTP/` status line
/// (one per redirect hop) resets what was collected before it.
pub fn parse_headers(lines: &[String]) -> HeaderInfo {
    let mut info = HeaderInfo::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            info = HeaderInfo {
                status: line
                    .split_whitespace()
                    .nth(1)
                    .and_then(|c| c.parse::<u32>().ok()),
                ..HeaderInfo::default()
            };
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.parse::<u64>() {
                    info.content_length = Some(n);
                }
            }
            if name.eq_ignore_ascii_case("accept-ranges") {
                info.accept_ranges = value.eq_ignore_ascii_case("bytes");
            }
            if name.eq_ignore_ascii_case("content-range") {
                info.content_range = parse_content_range(value);
            }
        }
    }

    info
}

fn parse_content_range(value: &str) -> Option<(u64, u64)> {
    let rest = value.strip_prefix("bytes")?.trim();
    let (span, _total) = rest.split_once('/')?;
    let (start, end) = span.split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}
