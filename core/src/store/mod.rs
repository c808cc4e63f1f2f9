//! Persistence ports and their implementations.
//!
//! RULE: only store implementations touch storage.
//! Components depend on these traits and never on a concrete backend.
//!
//! Every write that changes money or status is conditional. Methods that
//! return `bool` report whether the guarded write happened; `false` means
//! the guard did not hold (missing row, wrong status, stale version, or an
//! already-applied period) and nothing was written.

mod memory;
mod sqlite;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

use crate::{
    error::LedgerResult,
    event::{EventLogEntry, LedgerEvent},
    model::{Account, Investment, InvestmentStatus, Transaction, TransactionStatus},
    types::{Money, Timestamp},
};

/// Attempts at a version-guarded read-then-write before giving up.
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

pub trait AccountStore {
    fn insert_account(&self, account: &Account) -> LedgerResult<()>;

    fn account(&self, account_id: &str) -> LedgerResult<Option<Account>>;

    fn accounts(&self) -> LedgerResult<Vec<Account>>;

    /// Atomic increment of `total_realized_profit`. `delta` must be >= 0.
    fn add_realized_profit(&self, account_id: &str, delta: Money) -> LedgerResult<bool>;
}

pub trait InvestmentStore {
    fn insert_investment(&self, investment: &Investment) -> LedgerResult<()>;

    fn investment(&self, investment_id: &str) -> LedgerResult<Option<Investment>>;

    /// Active investments owned by `account_id`, newest first.
    fn active_investments_for(&self, account_id: &str) -> LedgerResult<Vec<Investment>>;

    /// Every active investment, oldest first.
    fn active_investments(&self) -> LedgerResult<Vec<Investment>>;

    /// Atomic increment of an active investment's position.
    fn increment_position(&self, investment_id: &str, delta: Money) -> LedgerResult<bool>;

    /// Compare-and-swap of position and status, guarded by `expected_version`
    /// and by the investment still being active.
    fn write_position(
        &self,
        investment_id: &str,
        expected_version: u64,
        position: Money,
        status: InvestmentStatus,
    ) -> LedgerResult<bool>;

    /// Adds `profit` and stamps `last_accrual_at = accrued_at`, guarded by
    /// `expected_version`, active status, and `last_accrual_at < period_start`.
    fn record_accrual(
        &self,
        investment_id: &str,
        expected_version: u64,
        profit: Money,
        accrued_at: Timestamp,
        period_start: Timestamp,
    ) -> LedgerResult<bool>;
}

pub trait TransactionLog {
    fn insert_transaction(&self, transaction: &Transaction) -> LedgerResult<()>;

    fn transaction(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>>;

    /// Every transaction for `account_id`, newest first.
    fn transactions_for(&self, account_id: &str) -> LedgerResult<Vec<Transaction>>;

    /// The approval queue, oldest first.
    fn pending_transactions(&self) -> LedgerResult<Vec<Transaction>>;

    /// The single serialization point for resolution: `pending -> status`.
    /// Returns false when the transaction had already left `pending`.
    fn resolve_transaction(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
        resolved_at: Timestamp,
    ) -> LedgerResult<bool>;
}

pub trait EventLog {
    fn append_event(&self, event: &LedgerEvent, recorded_at: Timestamp) -> LedgerResult<()>;

    fn events_for(&self, entity_id: &str) -> LedgerResult<Vec<EventLogEntry>>;
}

/// Everything the ledger core needs from storage.
pub trait LedgerStore: AccountStore + InvestmentStore + TransactionLog + EventLog + Send + Sync {
    /// Run `f` as one all-or-nothing unit. If `f` fails, none of its writes
    /// are visible to anyone. Nested calls join the outer unit.
    fn atomic<T, F>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce() -> LedgerResult<T>;
}
