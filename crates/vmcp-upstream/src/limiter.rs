//! Per-upstream concurrency bound with a bounded wait queue (spec §5 "At
//! most K concurrent outbound calls per upstream... excess calls queue up
//! to `queue_bound`, then fail `UpstreamSaturated`").

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    queue_bound: usize,
    outstanding: Arc<AtomicUsize>,
}

/// Held for the lifetime of one outbound call: releases the semaphore
/// permit and frees a slot in the logical queue bound on drop.
pub struct CallPermit {
    _permit: OwnedSemaphorePermit,
    outstanding: Arc<AtomicUsize>,
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize, queue_bound: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            queue_bound,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reserve a slot, queueing if all `capacity` permits are busy, up to
    /// `queue_bound` additional waiters. Returns `None` once running +
    /// queued calls already fill `capacity + queue_bound` — the caller
    /// maps that to `UpstreamSaturated` without ever waiting.
    pub async fn acquire(&self) -> Option<CallPermit> {
        let previous = self.outstanding.fetch_add(1, Ordering::AcqRel);
        if previous >= self.capacity + self.queue_bound {
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => Some(CallPermit {
                _permit: permit,
                outstanding: Arc::clone(&self.outstanding),
            }),
            Err(_) => {
                self.outstanding.fetch_sub(1, Ordering::AcqRel);
                None
            }
        }
    }
}
