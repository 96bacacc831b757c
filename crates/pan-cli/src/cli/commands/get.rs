//! `pan get` – download one URL.

use anyhow::{bail, Context, Result};
use pan_core::config::PanConfig;
use pan_core::source::CurlSource;
use pan_core::{ChunkDownload, TransferManager};
use std::path::PathBuf;

#[derive(Debug)]
pub struct GetArgs {
    pub url: String,
    pub output: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub size: Option<u64>,
    pub chunk_size: Option<u64>,
    pub concurrency: Option<usize>,
    pub headers: Vec<String>,
}

/// Split `Name: value`.
pub(crate) fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("invalid header {:?}, expected `Name: value`", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("invalid header {:?}: empty name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

pub async fn run_get(cfg: &PanConfig, args: GetArgs) -> Result<()> {
    let mut source = CurlSource::new(&args.url);
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        source = source.header(name, value);
    }
    let dir = match args.dir {
        Some(d) => d,
        None => std::env::current_dir()?,
    };

    let manager = TransferManager::from_config(&cfg.transfer);
    let mut job = ChunkDownload::new(source, manager.clone())
        .chunk_size(args.chunk_size.unwrap_or(cfg.transfer.chunk_size))
        .concurrency(args.concurrency.unwrap_or(cfg.transfer.concurrency))
        .retry_policy(cfg.transfer.retry_policy())
        .temp_root(cfg.server.temp_root())
        .progress_interval(cfg.transfer.progress_interval())
        .output_directory(dir);
    if let Some(size) = args.size {
        job = job.file_size(size);
    }
    if let Some(output) = args.output {
        job = job.output_file(output);
    }

    let stopper = manager.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted, waiting for in-flight requests...");
            stopper.shutdown().await;
        }
    });
    let result = job.run().await;
    interrupt.abort();

    match result {
        Ok(outcome) => {
            let path = outcome
                .path
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            println!(
                "{}: {} bytes ({} fetched, {} resumed)",
                path, outcome.total_bytes, outcome.transferred_bytes, outcome.resumed_bytes
            );
            Ok(())
        }
        Err(e) if e.is_shutdown() => {
            bail!("download stopped; run the same command again to resume")
        }
        Err(e) => Err(e).with_context(|| format!("download {}", args.url)),
    }
}
