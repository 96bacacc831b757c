//! Error types for the transfer engine.
//!
//! `ChunkError` describes the failure of a single range request and is used to
//! decide whether the range is requeued. `TransferError` is the job-level
//! outcome handed back to the caller.

use std::io;
use thiserror::Error;

/// Failure of one ranged request (or the metadata probe).
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Network/transport failure (connect, resolve, reset, timeout).
    #[error("transport: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Transport succeeded but the response status was not 2xx.
    #[error("HTTP {0}")]
    Http(u32),
    /// 2xx response that is not the requested slice (e.g. the server ignored `Range`).
    #[error("invalid range response: HTTP {0}")]
    InvalidRangeResponse(u32),
    /// Response ended before the whole range arrived.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// Writing the chunk file failed (disk full, permission denied). Not retried.
    #[error("storage: {0}")]
    Storage(#[source] io::Error),
}

impl ChunkError {
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        ChunkError::Transport(err.into())
    }

    /// Transport and protocol failures are retried per chunk; storage failures are fatal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChunkError::Transport(_)
            | ChunkError::Http(_)
            | ChunkError::InvalidRangeResponse(_)
            | ChunkError::PartialTransfer { .. } => true,
            ChunkError::Storage(_) => false,
        }
    }
}

/// Job-level failure returned by [`crate::ChunkDownload::run`] and the driver operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Cooperative shutdown was observed; partial state is kept for a later attempt.
    #[error("service is shutdown")]
    Shutdown,
    /// The total size could not be established.
    #[error("size unknown: {0}")]
    SizeUnknown(String),
    /// Local file create/open/copy/remove failure.
    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: io::Error,
    },
    /// A range kept failing after the configured number of retries.
    #[error("range {index} ({start}-{end}) failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        index: usize,
        start: u64,
        end: u64,
        attempts: u32,
        #[source]
        source: ChunkError,
    },
    /// A range failed with an error that is never retried.
    #[error("range {index}: {source}")]
    Chunk {
        index: usize,
        #[source]
        source: ChunkError,
    },
    /// The metadata probe failed at the transport level.
    #[error("probe failed: {0}")]
    Probe(#[source] ChunkError),
    /// A background task panicked or was cancelled by the runtime.
    #[error("task join: {0}")]
    Join(String),
    /// Failure reported by a provider driver.
    #[error("driver: {0}")]
    Driver(String),
    /// The request cannot be served as given (wrong object type, empty path).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransferError {
    pub fn storage(context: impl Into<String>, source: io::Error) -> Self {
        TransferError::Storage {
            context: context.into(),
            source,
        }
    }

    /// True when the job stopped because of shutdown rather than a broken input.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, TransferError::Shutdown)
    }
}

impl From<tokio::task::JoinError> for TransferError {
    fn from(e: tokio::task::JoinError) -> Self {
        TransferError::Join(e.to_string())
    }
}
