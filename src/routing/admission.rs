use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::router::RouteClass;
use crate::constants::{DEFAULT_COMPLEX_LIMIT, DEFAULT_SIMPLE_LIMIT, DEFAULT_UNKNOWN_LIMIT};

pub const MAX_SIMPLE_LIMIT: usize = 1000;
pub const MAX_COMPLEX_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionConfig {
    pub simple_limit: usize,
    pub complex_limit: usize,
    pub unknown_limit: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            simple_limit: DEFAULT_SIMPLE_LIMIT,
            complex_limit: DEFAULT_COMPLEX_LIMIT,
            unknown_limit: DEFAULT_UNKNOWN_LIMIT,
        }
    }
}

impl AdmissionConfig {
    pub fn new(simple_limit: usize, complex_limit: usize) -> Self {
        Self {
            simple_limit,
            complex_limit,
            ..Default::default()
        }
    }

    pub fn limit(&self, class: RouteClass) -> usize {
        match class {
            RouteClass::Simple => self.simple_limit,
            RouteClass::Complex => self.complex_limit,
            RouteClass::Unknown => self.unknown_limit,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_SIMPLE_LIMIT).contains(&self.simple_limit) {
            return Err(format!(
                "simple concurrency limit must be between 1 and {MAX_SIMPLE_LIMIT}, got {}",
                self.simple_limit
            ));
        }
        if !(1..=MAX_COMPLEX_LIMIT).contains(&self.complex_limit) {
            return Err(format!(
                "complex concurrency limit must be between 1 and {MAX_COMPLEX_LIMIT}, got {}",
                self.complex_limit
            ));
        }
        if self.unknown_limit == 0 {
            return Err("unknown concurrency limit must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("admission for {class} is closed")]
    Closed { class: RouteClass },

    #[error("no {class} slot freed within {waited:?}")]
    Timeout { class: RouteClass, waited: Duration },
}

#[derive(Debug)]
struct ClassSlot {
    semaphore: Arc<Semaphore>,
    limit: usize,
    usage: AtomicU64,
}

/// Held for the whole handling of one case; dropping it frees the slot.
#[derive(Debug)]
pub struct AdmissionTicket {
    class: RouteClass,
    waited: Duration,
    _permit: OwnedSemaphorePermit,
}

impl AdmissionTicket {
    pub fn class(&self) -> RouteClass {
        self.class
    }

    /// Time spent queued before the slot was granted.
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotStats {
    pub available: usize,
    pub limit: usize,
    pub in_use: usize,
    pub usage_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AdmissionStats {
    pub simple: SlotStats,
    pub complex: SlotStats,
    pub unknown: SlotStats,
}

/// Per-class bounded concurrency. Classes never borrow each other's slots.
#[derive(Debug)]
pub struct AdmissionController {
    simple: ClassSlot,
    complex: ClassSlot,
    unknown: ClassSlot,
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(&AdmissionConfig::default())
    }
}

impl AdmissionController {
    pub fn new(config: &AdmissionConfig) -> Self {
        let slot = |limit: usize| ClassSlot {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            usage: AtomicU64::new(0),
        };
        Self {
            simple: slot(config.simple_limit),
            complex: slot(config.complex_limit),
            unknown: slot(config.unknown_limit),
        }
    }

    fn slot(&self, class: RouteClass) -> &ClassSlot {
        match class {
            RouteClass::Simple => &self.simple,
            RouteClass::Complex => &self.complex,
            RouteClass::Unknown => &self.unknown,
        }
    }

    /// Waits until a slot for `class` is free. Dropping the future before it
    /// resolves leaves every slot untouched.
    pub async fn acquire(&self, class: RouteClass) -> Result<AdmissionTicket, AdmissionError> {
        let slot = self.slot(class);
        let started = Instant::now();
        let permit = Arc::clone(&slot.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| AdmissionError::Closed { class })?;
        slot.usage.fetch_add(1, Ordering::Relaxed);

        let waited = started.elapsed();
        if !waited.is_zero() {
            debug!(class = %class, waited_ms = waited.as_millis() as u64, "Admission granted after wait");
        }
        Ok(AdmissionTicket {
            class,
            waited,
            _permit: permit,
        })
    }

    pub async fn acquire_timeout(
        &self,
        class: RouteClass,
        timeout: Duration,
    ) -> Result<AdmissionTicket, AdmissionError> {
        match tokio::time::timeout(timeout, self.acquire(class)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(class = %class, timeout_ms = timeout.as_millis() as u64, "Admission timed out");
                Err(AdmissionError::Timeout {
                    class,
                    waited: timeout,
                })
            }
        }
    }

    pub fn available(&self, class: RouteClass) -> usize {
        self.slot(class).semaphore.available_permits()
    }

    pub fn limit(&self, class: RouteClass) -> usize {
        self.slot(class).limit
    }

    /// Rejects all waiting and future acquisitions. Tickets already issued stay valid.
    pub fn close(&self) {
        for class in RouteClass::ALL {
            self.slot(class).semaphore.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.simple.semaphore.is_closed()
    }

    fn slot_stats(&self, class: RouteClass) -> SlotStats {
        let slot = self.slot(class);
        let available = slot.semaphore.available_permits();
        SlotStats {
            available,
            limit: slot.limit,
            in_use: slot.limit.saturating_sub(available),
            usage_count: slot.usage.load(Ordering::Relaxed),
        }
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            simple: self.slot_stats(RouteClass::Simple),
            complex: self.slot_stats(RouteClass::Complex),
            unknown: self.slot_stats(RouteClass::Unknown),
        }
    }
}
