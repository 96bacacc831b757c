pub mod config;
pub mod logging;

// Transfer engine
pub mod admission;
pub mod driver;
pub mod error;
pub mod manager;
pub mod planner;
pub mod progress;
pub mod recovery;
pub mod retry;
pub mod source;
pub mod transfer;
pub mod upload;

#[cfg(test)]
mod testing;

pub use error::{ChunkError, TransferError};
pub use manager::TransferManager;
pub use transfer::{ChunkDownload, TransferOutcome};
