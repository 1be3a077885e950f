//! Scheduling gates that keep outbound calls under an upstream's rate limit.

use async_trait::async_trait;
use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};
use tokio::time::Instant;

/// A gate that outbound calls pass through before they are made.
///
/// `acquire` returns once the caller is allowed to proceed. Callers that share
/// a gate share its budget, regardless of what they are calling for.
#[async_trait]
pub trait RateGate: Send + Sync {
    /// Wait until the next call may proceed.
    async fn acquire(&self);
}

/// A leaky bucket with a capacity of one: calls leave the bucket one at a
/// time, at least `interval` apart, in the order they arrived.
///
/// Each caller reserves the next free slot under a short lock, and then sleeps
/// until that slot without holding the lock.
#[derive(Debug)]
pub struct LeakyBucketGate {
    /// The minimum spacing between two calls.
    interval: Duration,

    /// The earliest instant the next caller may proceed at, if any call has
    /// been made yet.
    next_slot: Mutex<Option<Instant>>,
}

impl LeakyBucketGate {
    /// Create a gate that lets calls through at most once per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// The minimum spacing between two calls.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reserve the next free slot, and return when it starts.
    fn reserve(&self) -> Instant {
        let mut next_slot = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let slot = next_slot.map_or(now, |next| next.max(now));
        *next_slot = Some(slot + self.interval);
        slot
    }
}

#[async_trait]
impl RateGate for LeakyBucketGate {
    async fn acquire(&self) {
        let slot = self.reserve();
        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::debug!(r#type = "gate.wait", wait_ms = wait.as_millis() as u64, "Rate limiting");
            tokio::time::sleep_until(slot).await;
        }
    }
}

/// A gate that never waits. For tests and for upstreams without a rate limit.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ungated;

#[async_trait]
impl RateGate for Ungated {
    async fn acquire(&self) {}
}
