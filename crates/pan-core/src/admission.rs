//! Process-wide admission control for chunk requests.
//!
//! Every job's workers draw from the same pool: a job may run N workers, but
//! only `capacity` of all workers system-wide may be transferring bytes at any
//! instant. A slot is taken right before a range request and dropped as soon
//! as the request ends, success or failure.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::TransferError;

/// Shared pool of admission slots.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

/// One unit of the admission budget. Released on drop.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    /// Create a pool with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<AdmissionSlot, TransferError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| TransferError::Shutdown)?;
        Ok(AdmissionSlot { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}
