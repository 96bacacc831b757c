//! Minimal HTTP/1.1 server with HEAD and Range GET for integration tests.
//!
//! Serves one static body. HEAD answers with Content-Length; GET with a Range
//! header answers 206 with the exact slice. Faults can be injected per range
//! and every request is logged.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD omits Content-Length.
    pub advertise_length: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Answer the first N GETs of every distinct range with 500.
    pub fail_first_gets: u32,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            advertise_length: true,
            support_ranges: true,
            fail_first_gets: 0,
        }
    }
}

/// One request as the server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub range: Option<(u64, u64)>,
}

pub struct RangeServer {
    pub url: String,
    log: Arc<Mutex<Vec<Request>>>,
}

impl RangeServer {
    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }

    /// Sorted ranges of all GET requests.
    pub fn get_ranges(&self) -> Vec<(u64, u64)> {
        let mut v: Vec<_> = self
            .requests()
            .into_iter()
            .filter(|r| r.method == "GET")
            .filter_map(|r| r.range)
            .collect();
        v.sort();
        v
    }
}

struct State {
    body: Vec<u8>,
    opts: RangeServerOptions,
    failures: Mutex<HashMap<(u64, u64), u32>>,
    log: Arc<Mutex<Vec<Request>>>,
}

/// Serve `body` on an ephemeral port until the process exits. The URL path is `/<name>`.
pub fn start(body: Vec<u8>, name: &str) -> RangeServer {
    start_with_options(body, name, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, name: &str, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let log = Arc::new(Mutex::new(Vec::new()));
    let state = Arc::new(State {
        body,
        opts,
        failures: Mutex::new(HashMap::new()),
        log: Arc::clone(&log),
    });
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&state);
            thread::spawn(move || handle(stream, &state));
        }
    });
    RangeServer {
        url: format!("http://127.0.0.1:{}/{}", port, name),
        log,
    }
}

fn handle(mut stream: TcpStream, state: &State) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, range) = parse_request(request);
    state.log.lock().unwrap().push(Request {
        method: method.to_ascii_uppercase(),
        range,
    });
    let body = &state.body;
    let total = body.len() as u64;

    if method.eq_ignore_ascii_case("HEAD") {
        let length = if state.opts.advertise_length {
            format!("Content-Length: {}\r\n", total)
        } else {
            String::new()
        };
        let response = format!("HTTP/1.1 200 OK\r\n{}Accept-Ranges: bytes\r\nConnection: close\r\n\r\n", length);
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    if let Some(r) = range {
        let mut failures = state.failures.lock().unwrap();
        let seen = failures.entry(r).or_insert(0);
        if *seen < state.opts.fail_first_gets {
            *seen += 1;
            drop(failures);
            let _ = stream.write_all(
                b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 5\r\nConnection: close\r\n\r\noops!",
            );
            return;
        }
    }

    let (status, content_range, slice) = match range {
        Some((start, end_incl)) if state.opts.support_ranges => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl {
                ("416 Range Not Satisfiable", format!("bytes */{}", total), &body[0..0])
            } else {
                (
                    "206 Partial Content",
                    format!("bytes {}-{}/{}", start, end_incl, total),
                    &body[start as usize..=end_incl as usize],
                )
            }
        }
        _ => (
            "200 OK",
            format!("bytes 0-{}/{}", total.saturating_sub(1), total),
            &body[..],
        ),
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Range: {}\r\nConnection: close\r\n\r\n",
        status,
        slice.len(),
        content_range
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}

/// Returns (method, optional (start, end_inclusive) for `Range: bytes=X-Y`).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("range") {
            continue;
        }
        let Some(bounds) = value.trim().strip_prefix("bytes=") else {
            continue;
        };
        if let Some((a, b)) = bounds.split_once('-') {
            let start = a.trim().parse::<u64>().unwrap_or(0);
            let end = b.trim().parse::<u64>().unwrap_or(u64::MAX);
            range = Some((start, end));
        }
    }
    (method, range)
}
