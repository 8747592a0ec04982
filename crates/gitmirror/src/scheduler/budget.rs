//! Shared concurrency budget for sync execution.
//!
//! One semaphore serves every execution site. Peak and off-peak hours only
//! change its capacity. Growing takes effect immediately; shrinking below the
//! number of permits in use is recorded as debt and paid off as permits come
//! back, so the in-flight count converges to the new cap without cancelling
//! anything.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Peak/off-peak concurrency caps.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Half-open hour range `start-end`, e.g. `9-18`.
    pub peak_hours: String,
    pub peak_max_concurrent: usize,
    pub off_peak_max_concurrent: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            peak_hours: "9-18".to_string(),
            peak_max_concurrent: 3,
            off_peak_max_concurrent: 8,
        }
    }
}

impl ConcurrencyConfig {
    /// Whether `hour` falls in the peak range. An unparsable range is never peak.
    pub fn is_peak(&self, hour: u32) -> bool {
        match parse_hours(&self.peak_hours) {
            Some((start, end)) => start <= hour && hour < end,
            None => false,
        }
    }

    /// The cap in force at `hour`.
    pub fn cap_at(&self, hour: u32) -> usize {
        if self.is_peak(hour) {
            self.peak_max_concurrent
        } else {
            self.off_peak_max_concurrent
        }
    }
}

fn parse_hours(range: &str) -> Option<(u32, u32)> {
    let (start, end) = range.trim().split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}

/// Free slots under `cap` given `running` tasks.
pub fn available_slots(cap: usize, running: usize) -> usize {
    cap.saturating_sub(running)
}

#[derive(Debug)]
struct Ledger {
    capacity: usize,
    debt: usize,
}

#[derive(Debug)]
struct Inner {
    semaphore: Arc<Semaphore>,
    ledger: Mutex<Ledger>,
}

impl Inner {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle to the shared budget.
#[derive(Debug, Clone)]
pub struct SyncBudget {
    inner: Arc<Inner>,
}

impl SyncBudget {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                ledger: Mutex::new(Ledger { capacity, debt: 0 }),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.ledger().capacity
    }

    /// Permits that can be taken right now.
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Permits currently held.
    pub fn in_use(&self) -> usize {
        let ledger = self.inner.ledger();
        (ledger.capacity + ledger.debt).saturating_sub(self.inner.semaphore.available_permits())
    }

    /// Change the cap. Excess held permits are retired as they are released.
    pub fn set_capacity(&self, capacity: usize) {
        let mut ledger = self.inner.ledger();
        if capacity == ledger.capacity {
            return;
        }

        if capacity > ledger.capacity {
            let mut grow = capacity - ledger.capacity;
            let repaid = grow.min(ledger.debt);
            ledger.debt -= repaid;
            grow -= repaid;
            if grow > 0 {
                self.inner.semaphore.add_permits(grow);
            }
        } else {
            let shrink = ledger.capacity - capacity;
            let forgotten = self.inner.semaphore.forget_permits(shrink);
            ledger.debt += shrink - forgotten;
        }

        tracing::debug!(
            from = ledger.capacity,
            to = capacity,
            debt = ledger.debt,
            "Resized sync budget"
        );
        ledger.capacity = capacity;
    }

    /// Take a permit without waiting.
    pub fn try_acquire(&self) -> Option<BudgetPermit> {
        let permit = Arc::clone(&self.inner.semaphore).try_acquire_owned().ok()?;
        Some(BudgetPermit {
            permit: Some(permit),
            inner: Arc::clone(&self.inner),
        })
    }
}

/// A held execution slot. Released (or retired, if the budget shrank) on drop.
#[derive(Debug)]
pub struct BudgetPermit {
    permit: Option<OwnedSemaphorePermit>,
    inner: Arc<Inner>,
}

impl Drop for BudgetPermit {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        let mut ledger = self.inner.ledger();
        if ledger.debt > 0 {
            ledger.debt -= 1;
            permit.forget();
        }
        // Otherwise the permit returns to the semaphore here.
    }
}
