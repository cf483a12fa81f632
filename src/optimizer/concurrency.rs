//! # Concurrency Module
//!
//! Pool di permessi che limita quante catene di ottimizzazione girano insieme.
//! Validazione e upload non passano di qui: solo lo stadio di ottimizzazione
//! è soggetto ad admission control.

use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Fixed-size pool of optimization permits, shared by every pipeline run
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Held while a task chain runs; returns its slot on drop
#[derive(Debug)]
pub struct TaskPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait, without timeout, until a slot frees up
    pub async fn acquire(&self) -> Result<TaskPermit, AcquireError> {
        if self.semaphore.available_permits() == 0 {
            debug!("All {} optimization slots busy, waiting", self.capacity);
        }
        let permit = self.semaphore.clone().acquire_owned().await?;
        Ok(TaskPermit { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
