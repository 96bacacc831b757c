//! End-to-end: `ChunkDownload` over `CurlSource` against a local range server.

mod common;

use common::range_server::{self, RangeServerOptions};
use pan_core::retry::RetryPolicy;
use pan_core::source::{CurlSource, RangeSource};
use pan_core::{ChunkDownload, ChunkError, TransferError, TransferManager};
use tempfile::tempdir;

fn body(len: usize) -> Vec<u8> {
    (0u8..251).cycle().take(len).collect()
}

#[tokio::test]
async fn ranged_download_matches_body() {
    let data = body(1_000_000);
    let server = range_server::start(data.clone(), "movie.bin");
    let tmp = tempdir().unwrap();

    let outcome = ChunkDownload::new(CurlSource::new(&server.url), TransferManager::new(4))
        .chunk_size(300_000)
        .concurrency(4)
        .temp_root(tmp.path().join("recovery"))
        .output_directory(tmp.path().join("out"))
        .run()
        .await
        .expect("download");

    let path = tmp.path().join("out/movie.bin");
    assert_eq!(outcome.path.as_deref(), Some(path.as_path()));
    assert_eq!(std::fs::read(&path).unwrap(), data);
    assert_eq!(
        server.get_ranges(),
        vec![
            (0, 299_999),
            (300_000, 599_999),
            (600_000, 899_999),
            (900_000, 999_999)
        ]
    );
    assert!(server.requests().iter().any(|r| r.method == "HEAD"));
    assert_eq!(std::fs::read_dir(tmp.path().join("recovery")).unwrap().count(), 0);
}

#[tokio::test]
async fn server_errors_are_retried() {
    let data = body(50_000);
    let server = range_server::start_with_options(
        data.clone(),
        "a.bin",
        RangeServerOptions {
            fail_first_gets: 2,
            ..RangeServerOptions::default()
        },
    );
    let tmp = tempdir().unwrap();

    ChunkDownload::new(CurlSource::new(&server.url), TransferManager::new(2))
        .file_size(50_000)
        .chunk_size(20_000)
        .concurrency(2)
        .retry_policy(RetryPolicy::with_max_retries(3))
        .temp_root(tmp.path())
        .output_file(tmp.path().join("a.bin"))
        .run()
        .await
        .expect("download");

    assert_eq!(std::fs::read(tmp.path().join("a.bin")).unwrap(), data);
    assert_eq!(server.get_ranges().len(), 9);
}

#[tokio::test]
async fn persistent_server_errors_exhaust_retries() {
    let server = range_server::start_with_options(
        body(10_000),
        "a.bin",
        RangeServerOptions {
            fail_first_gets: 100,
            ..RangeServerOptions::default()
        },
    );
    let tmp = tempdir().unwrap();

    let err = ChunkDownload::new(CurlSource::new(&server.url), TransferManager::new(2))
        .file_size(10_000)
        .chunk_size(10_000)
        .retry_policy(RetryPolicy::with_max_retries(2))
        .temp_root(tmp.path())
        .output_file(tmp.path().join("a.bin"))
        .run()
        .await
        .unwrap_err();

    match err {
        TransferError::RetriesExhausted {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 2);
            assert!(matches!(source, ChunkError::Http(500)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn ignored_range_header_is_rejected() {
    let server = range_server::start_with_options(
        body(10_000),
        "a.bin",
        RangeServerOptions {
            support_ranges: false,
            ..RangeServerOptions::default()
        },
    );
    let source = CurlSource::new(&server.url);
    let mut sink = Vec::new();
    let err = tokio::task::spawn_blocking(move || {
        source.fetch_range(5_000, 9_999, &mut sink, &mut |_| {})
    })
    .await
    .unwrap()
    .unwrap_err();
    assert!(matches!(err, ChunkError::InvalidRangeResponse(200)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn full_body_for_first_range_reports_real_status() {
    let server = range_server::start_with_options(
        body(10_000),
        "a.bin",
        RangeServerOptions {
            support_ranges: false,
            ..RangeServerOptions::default()
        },
    );
    let source = CurlSource::new(&server.url);
    let mut sink = Vec::new();
    let err = tokio::task::spawn_blocking(move || {
        source.fetch_range(0, 999, &mut sink, &mut |_| {})
    })
    .await
    .unwrap()
    .unwrap_err();
    assert!(
        matches!(err, ChunkError::InvalidRangeResponse(200)),
        "unexpected error: {err:?}"
    );
    assert!(err.to_string().contains("200"));
}

#[tokio::test]
async fn missing_content_length_is_size_unknown() {
    let server = range_server::start_with_options(
        body(10),
        "a.bin",
        RangeServerOptions {
            advertise_length: false,
            ..RangeServerOptions::default()
        },
    );
    let tmp = tempdir().unwrap();

    let err = ChunkDownload::new(CurlSource::new(&server.url), TransferManager::new(1))
        .temp_root(tmp.path())
        .output_directory(tmp.path())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::SizeUnknown(_)));
}

#[test]
fn probe_reports_length() {
    let server = range_server::start(body(1234), "a.bin");
    let source = CurlSource::new(&server.url);
    assert_eq!(source.content_length().unwrap(), Some(1234));
    assert_eq!(source.locator(), server.url);
}
