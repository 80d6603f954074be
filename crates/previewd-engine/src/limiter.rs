//! Process-wide conversion slot limiter.
//!
//! One instance is constructed at startup and injected into the
//! coordinator; every heavy conversion, regardless of derivative kind,
//! takes a permit from the same pool. Waiters are served in FIFO order
//! (tokio's `Semaphore` is fair), and permits are RAII guards so release
//! runs on every exit path, panics included.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::PreviewError;

/// Counting semaphore bounding concurrently running conversions.
#[derive(Debug, Clone)]
pub struct ConversionLimiter {
    sem: Arc<Semaphore>,
    max_permits: usize,
}

/// One unit of allowed concurrent conversion work. Dropping it returns
/// the permit and wakes the oldest waiter.
#[derive(Debug)]
pub struct ConversionPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConversionLimiter {
    /// Create a limiter with the configured number of slots.
    pub fn new(max_permits: usize) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(max_permits)),
            max_permits,
        }
    }

    /// Suspend until a conversion slot is available.
    pub async fn acquire(&self) -> Result<ConversionPermit, PreviewError> {
        let permit = Arc::clone(&self.sem)
            .acquire_owned()
            .await
            .map_err(|_| PreviewError::LimiterClosed {
                reason: "conversion semaphore closed".to_string(),
            })?;
        Ok(ConversionPermit { _permit: permit })
    }

    /// Total configured slots.
    pub fn max_permits(&self) -> usize {
        self.max_permits
    }

    /// Currently idle slots.
    pub fn available_permits(&self) -> usize {
        self.sem.available_permits()
    }
}
