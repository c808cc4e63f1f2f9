//! Shared primitive types used across the entire ledger.

use chrono::{DateTime, TimeZone, Utc};

/// A USD amount. The ledger is single-currency.
pub type Money = f64;

/// A stable, unique identifier for any entity in the ledger.
pub type EntityId = String;

pub type AccountId = EntityId;
pub type InvestmentId = EntityId;
pub type TransactionId = EntityId;

/// Wall-clock instant. Always UTC.
pub type Timestamp = DateTime<Utc>;

/// Residual below which a position is treated as fully drained.
pub const MONEY_EPSILON: Money = 1e-6;

/// Days used to turn an annual yield into a daily one.
pub const DAYS_PER_YEAR: f64 = 365.0;

pub fn new_id() -> EntityId {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn to_millis(ts: Timestamp) -> i64 {
    ts.timestamp_millis()
}

/// None when `ms` lies outside chrono's representable range.
pub(crate) fn from_millis(ms: i64) -> Option<Timestamp> {
    Utc.timestamp_millis_opt(ms).single()
}
