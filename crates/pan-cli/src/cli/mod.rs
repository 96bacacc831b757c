//! CLI for the pan transfer engine.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pan_core::{config, logging};
use std::path::PathBuf;

use commands::{run_config, run_get, GetArgs};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "pan")]
#[command(about = "pan: chunked, resumable downloads", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a URL with parallel range requests. Interrupted runs resume.
    Get {
        /// Direct HTTP/HTTPS URL.
        url: String,
        /// Output file name (default: last URL path segment).
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Directory the output is written into (default: current directory).
        #[arg(short = 'd', long = "dir", value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Object size in bytes; probed with HEAD when omitted.
        #[arg(long, value_name = "N")]
        size: Option<u64>,
        /// Bytes per range request (default from config).
        #[arg(long, value_name = "N")]
        chunk_size: Option<u64>,
        /// Parallel range requests for this download (default from config).
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
        /// Extra request header, `Name: value`. Repeatable.
        #[arg(short = 'H', long = "header", value_name = "HEADER")]
        headers: Vec<String>,
    },

    /// Show the config file path and effective settings.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        if let Err(e) = logging::init_logging(&cfg.log, cfg.server.debug) {
            logging::init_logging_stderr(cfg.server.debug);
            tracing::warn!("file logging unavailable, using stderr: {:#}", e);
        }
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get {
                url,
                output,
                dir,
                size,
                chunk_size,
                concurrency,
                headers,
            } => {
                run_get(
                    &cfg,
                    GetArgs {
                        url,
                        output,
                        dir,
                        size,
                        chunk_size,
                        concurrency,
                        headers,
                    },
                )
                .await?
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}
