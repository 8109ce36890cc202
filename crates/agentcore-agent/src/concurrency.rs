//! Concurrency Guard (§4.1) — global slot limiter for background AI work.
//!
//! Built on `tokio::sync::Semaphore`, which is already FIFO-fair, so there is
//! no hand-rolled waiter queue to get wrong. `acquire` races the semaphore
//! against a deadline with `tokio::select!`, the same cancellation idiom used
//! throughout this crate. Release is just dropping the owned permit —
//! idempotent and exactly-once by construction.

use agentcore_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A held concurrency slot. Dropping it releases the slot; calling
/// `release()` explicitly is equivalent and safe to call at most once (the
/// permit is consumed by value).
pub struct GuardPermit(#[allow(dead_code)] OwnedSemaphorePermit);

impl GuardPermit {
    pub fn release(self) {
        // Dropping `self.0` releases the permit.
    }
}

/// Global slot limiter for background AI work (§4.1, §5).
pub struct ConcurrencyGuard {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn running(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Blocking acquire with a timeout. A waiter that times out leaves the
    /// queue even if a slot frees concurrently immediately after (the
    /// `select!` simply drops the losing future).
    pub async fn acquire(&self, timeout: Duration) -> Result<GuardPermit> {
        let sem = self.semaphore.clone();
        tokio::select! {
            biased;
            permit = sem.acquire_owned() => {
                let permit = permit.map_err(|_| Error::Persistence("semaphore closed".into()))?;
                Ok(GuardPermit(permit))
            }
            _ = tokio::time::sleep(timeout) => {
                Err(Error::CapacityTimeout(timeout))
            }
        }
    }

    /// Non-blocking acquire — used by the Trigger Engine, which simply skips
    /// a tick when at capacity (§4.13).
    pub fn try_acquire(&self) -> Option<GuardPermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(GuardPermit)
    }
}
