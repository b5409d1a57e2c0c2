//! Concurrency throttle for outbound requests
//!
//! Bounds the number of requests that are on the wire at once. Callers over
//! the limit suspend in FIFO order (tokio's semaphore is fair) until a slot
//! frees up. A [`PendingSlot`] is released when it is dropped, so success,
//! failure and cancellation all give the slot back.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument};

/// Errors returned while acquiring a slot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThrottleError {
    #[error("Concurrency throttle has been closed")]
    Closed,
    #[error("Invalid throttle configuration: {0}")]
    InvalidConfig(String),
}

/// Snapshot of throttle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleMetrics {
    /// Maximum concurrent slots
    pub max_concurrent: usize,
    /// Slots currently held
    pub in_flight: usize,
    /// Callers currently waiting for a slot
    pub queued: usize,
    /// Slots granted since creation
    pub total_admitted: u64,
}

impl ThrottleMetrics {
    pub fn is_at_capacity(&self) -> bool {
        self.in_flight >= self.max_concurrent
    }
}

#[derive(Debug)]
struct Counters {
    in_flight: AtomicUsize,
    queued: AtomicUsize,
    total_admitted: AtomicU64,
}

/// FIFO-fair bound on concurrently in-flight requests.
///
/// Cloning shares the same slots.
///
/// # Examples
///
/// ```rust
/// use taskdesk_common::resilience::ConcurrencyThrottle;
///
/// # async fn example() -> Result<(), taskdesk_common::resilience::ThrottleError> {
/// let throttle = ConcurrencyThrottle::new(2)?;
/// let slot = throttle.acquire().await?;
/// assert_eq!(throttle.metrics().in_flight, 1);
/// drop(slot);
/// assert_eq!(throttle.metrics().in_flight, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConcurrencyThrottle {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
}

/// A reservation of one unit of request concurrency.
///
/// Held for exactly as long as the request is on the wire.
#[derive(Debug)]
pub struct PendingSlot {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

// Keeps the queued counter honest when a waiter is cancelled.
struct QueueGuard<'a>(&'a AtomicUsize);

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConcurrencyThrottle {
    /// Create a throttle with `max_concurrent` slots.
    ///
    /// # Errors
    /// Returns [`ThrottleError::InvalidConfig`] if `max_concurrent` is zero.
    pub fn new(max_concurrent: usize) -> Result<Self, ThrottleError> {
        if max_concurrent == 0 {
            return Err(ThrottleError::InvalidConfig(
                "max_concurrent must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            counters: Arc::new(Counters {
                in_flight: AtomicUsize::new(0),
                queued: AtomicUsize::new(0),
                total_admitted: AtomicU64::new(0),
            }),
        })
    }

    /// Wait for a free slot.
    ///
    /// Dropping the returned future while waiting leaves the queue without
    /// consuming a slot.
    ///
    /// # Errors
    /// Returns [`ThrottleError::Closed`] after [`close`](Self::close).
    #[instrument(level = "trace", skip(self), fields(max = self.max_concurrent))]
    pub async fn acquire(&self) -> Result<PendingSlot, ThrottleError> {
        if let Some(slot) = self.try_acquire() {
            return Ok(slot);
        }

        self.counters.queued.fetch_add(1, Ordering::AcqRel);
        let _queued = QueueGuard(&self.counters.queued);
        debug!(
            in_flight = self.counters.in_flight.load(Ordering::Acquire),
            "throttle at capacity, waiting for slot"
        );

        let permit =
            Arc::clone(&self.semaphore).acquire_owned().await.map_err(|_| ThrottleError::Closed)?;
        Ok(self.admit(permit))
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<PendingSlot> {
        Arc::clone(&self.semaphore).try_acquire_owned().ok().map(|permit| self.admit(permit))
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> PendingSlot {
        self.counters.in_flight.fetch_add(1, Ordering::AcqRel);
        self.counters.total_admitted.fetch_add(1, Ordering::Relaxed);
        PendingSlot { _permit: permit, counters: Arc::clone(&self.counters) }
    }

    /// Stop admitting; pending and future waiters fail with `Closed`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn metrics(&self) -> ThrottleMetrics {
        ThrottleMetrics {
            max_concurrent: self.max_concurrent,
            in_flight: self.counters.in_flight.load(Ordering::Acquire),
            queued: self.counters.queued.load(Ordering::Acquire),
            total_admitted: self.counters.total_admitted.load(Ordering::Relaxed),
        }
    }
}
