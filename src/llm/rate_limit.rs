use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Spaces sends to the same model at least `interval` apart.
///
/// Each caller reserves the next free slot under the lock and sleeps outside
/// it, so concurrent callers queue instead of all firing after one wait.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time the caller must wait before sending to `model`; reserves the slot.
    fn reserve(&self, model: &str) -> Option<Instant> {
        let now = Instant::now();
        let mut slots = self.next_slot.lock();
        let slot = slots.get(model).copied().filter(|at| *at > now).unwrap_or(now);
        slots.insert(model.to_string(), slot + self.interval);
        (slot > now).then_some(slot)
    }

    pub async fn wait(&self, model: &str) {
        if self.interval.is_zero() {
            return;
        }
        if let Some(slot) = self.reserve(model) {
            debug!(model, wait_ms = slot.saturating_duration_since(Instant::now()).as_millis() as u64, "Rate limit wait");
            sleep_until(slot).await;
        }
    }
}
