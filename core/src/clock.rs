//! Ledger clock — the single source of "now" for every component.
//!
//! Production wires `SystemClock`. Tests drive a `ManualClock` so lock
//! maturity and accrual periods can be crossed without sleeping.

use crate::types::Timestamp;
use chrono::{Duration, Months, Utc};
use parking_lot::Mutex;

pub trait LedgerClock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl LedgerClock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, to: Timestamp) {
        *self.now.lock() = to;
    }

    /// Advance by `by`. Returns the new instant.
    pub fn advance(&self, by: Duration) -> Timestamp {
        let mut now = self.now.lock();
        *now += by;
        *now
    }

    /// Advance by whole calendar months (clamped to month end, like lock expiry).
    pub fn advance_months(&self, months: u32) -> Timestamp {
        let mut now = self.now.lock();
        if let Some(next) = now.checked_add_months(Months::new(months)) {
            *now = next;
        }
        *now
    }
}

impl LedgerClock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
