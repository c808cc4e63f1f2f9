//! In-memory store with the same guarded-write semantics as SQLite.
//!
//! `atomic` snapshots the mutable tables on entry to the outermost unit and
//! restores them if the unit fails. The event log is append-only, so only
//! its length is recorded and a failed unit truncates back to it.

use super::{AccountStore, EventLog, InvestmentStore, LedgerStore, TransactionLog};
use crate::{
    error::{LedgerError, LedgerResult},
    event::{EventLogEntry, LedgerEvent},
    model::{Account, Investment, InvestmentStatus, Transaction, TransactionStatus},
    types::{Money, Timestamp},
};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
#[cfg(test)]
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
struct Tables {
    accounts: Vec<Account>,
    investments: Vec<Investment>,
    transactions: Vec<Transaction>,
    events: Vec<EventLogEntry>,
}

/// Rollback point for the outermost atomic unit.
struct Snapshot {
    accounts: Vec<Account>,
    investments: Vec<Investment>,
    transactions: Vec<Transaction>,
    events_len: usize,
}

impl Tables {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            accounts: self.accounts.clone(),
            investments: self.investments.clone(),
            transactions: self.transactions.clone(),
            events_len: self.events.len(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.accounts = snapshot.accounts;
        self.investments = snapshot.investments;
        self.transactions = snapshot.transactions;
        self.events.truncate(snapshot.events_len);
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: Tables,
    depth: u32,
    #[cfg(test)]
    failing_investments: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: ReentrantMutex<RefCell<MemoryState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(&state.tables)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state.tables)
    }

    /// Make every write against `investment_id` fail with a storage error.
    #[cfg(test)]
    pub(crate) fn fail_writes_for(&self, investment_id: &str) {
        let guard = self.state.lock();
        guard.borrow_mut().failing_investments.insert(investment_id.to_string());
    }

    #[cfg(test)]
    fn check_writable(&self, investment_id: &str) -> LedgerResult<()> {
        let guard = self.state.lock();
        if guard.borrow().failing_investments.contains(investment_id) {
            return Err(LedgerError::Persistence(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_IOERR),
                Some(format!("injected failure for {investment_id}")),
            )));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_writable(&self, _investment_id: &str) -> LedgerResult<()> {
        Ok(())
    }
}

impl LedgerStore for MemoryLedger {
    fn atomic<T, F>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce() -> LedgerResult<T>,
    {
        let guard = self.state.lock();
        let snapshot = {
            let mut state = guard.borrow_mut();
            state.depth += 1;
            (state.depth == 1).then(|| state.tables.snapshot())
        };
        let out = f();
        let mut state = guard.borrow_mut();
        state.depth -= 1;
        if let (Err(_), Some(snapshot)) = (&out, snapshot) {
            state.tables.restore(snapshot);
        }
        out
    }
}

impl AccountStore for MemoryLedger {
    fn insert_account(&self, account: &Account) -> LedgerResult<()> {
        self.write(|t| {
            if t.accounts.iter().any(|a| a.account_id == account.account_id) {
                return Err(LedgerError::validation(format!(
                    "account '{}' already exists",
                    account.account_id
                )));
            }
            t.accounts.push(account.clone());
            Ok(())
        })
    }

    fn account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        Ok(self.read(|t| t.accounts.iter().find(|a| a.account_id == account_id).cloned()))
    }

    fn accounts(&self) -> LedgerResult<Vec<Account>> {
        Ok(self.read(|t| t.accounts.clone()))
    }

    fn add_realized_profit(&self, account_id: &str, delta: Money) -> LedgerResult<bool> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(LedgerError::validation(format!(
                "realized profit delta {delta} must be non-negative"
            )));
        }
        Ok(self.write(|t| match t.accounts.iter_mut().find(|a| a.account_id == account_id) {
            Some(a) => {
                a.total_realized_profit += delta;
                true
            }
            None => false,
        }))
    }
}

impl InvestmentStore for MemoryLedger {
    fn insert_investment(&self, investment: &Investment) -> LedgerResult<()> {
        self.check_writable(&investment.investment_id)?;
        self.write(|t| {
            if !t.accounts.iter().any(|a| a.account_id == investment.account_id) {
                return Err(LedgerError::not_found("account", investment.account_id.clone()));
            }
            t.investments.push(investment.clone());
            Ok(())
        })
    }

    fn investment(&self, investment_id: &str) -> LedgerResult<Option<Investment>> {
        Ok(self.read(|t| {
            t.investments
                .iter()
                .find(|i| i.investment_id == investment_id)
                .cloned()
        }))
    }

    fn active_investments_for(&self, account_id: &str) -> LedgerResult<Vec<Investment>> {
        let mut v = self.read(|t| {
            t.investments
                .iter()
                .rev()
                .filter(|i| i.account_id == account_id && i.is_active())
                .cloned()
                .collect::<Vec<_>>()
        });
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(v)
    }

    fn active_investments(&self) -> LedgerResult<Vec<Investment>> {
        let mut v = self.read(|t| {
            t.investments
                .iter()
                .filter(|i| i.is_active())
                .cloned()
                .collect::<Vec<_>>()
        });
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(v)
    }

    fn increment_position(&self, investment_id: &str, delta: Money) -> LedgerResult<bool> {
        self.check_writable(investment_id)?;
        Ok(self.write(|t| {
            match t
                .investments
                .iter_mut()
                .find(|i| i.investment_id == investment_id && i.is_active())
            {
                Some(i) => {
                    i.principal_plus_accrued += delta;
                    i.version += 1;
                    true
                }
                None => false,
            }
        }))
    }

    fn write_position(
        &self,
        investment_id: &str,
        expected_version: u64,
        position: Money,
        status: InvestmentStatus,
    ) -> LedgerResult<bool> {
        self.check_writable(investment_id)?;
        if position < 0.0 {
            return Err(LedgerError::validation(format!(
                "position {position} would be negative"
            )));
        }
        Ok(self.write(|t| {
            match t.investments.iter_mut().find(|i| {
                i.investment_id == investment_id && i.version == expected_version && i.is_active()
            }) {
                Some(i) => {
                    i.principal_plus_accrued = position;
                    i.status = status;
                    i.version += 1;
                    true
                }
                None => false,
            }
        }))
    }

    fn record_accrual(
        &self,
        investment_id: &str,
        expected_version: u64,
        profit: Money,
        accrued_at: Timestamp,
        period_start: Timestamp,
    ) -> LedgerResult<bool> {
        self.check_writable(investment_id)?;
        Ok(self.write(|t| {
            match t.investments.iter_mut().find(|i| {
                i.investment_id == investment_id
                    && i.version == expected_version
                    && i.is_active()
                    && i.last_accrual_at < period_start
            }) {
                Some(i) => {
                    i.principal_plus_accrued += profit;
                    i.last_accrual_at = accrued_at;
                    i.version += 1;
                    true
                }
                None => false,
            }
        }))
    }
}

impl TransactionLog for MemoryLedger {
    fn insert_transaction(&self, transaction: &Transaction) -> LedgerResult<()> {
        self.write(|t| {
            if !t.accounts.iter().any(|a| a.account_id == transaction.account_id) {
                return Err(LedgerError::not_found("account", transaction.account_id.clone()));
            }
            t.transactions.push(transaction.clone());
            Ok(())
        })
    }

    fn transaction(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>> {
        Ok(self.read(|t| {
            t.transactions
                .iter()
                .find(|x| x.transaction_id == transaction_id)
                .cloned()
        }))
    }

    fn transactions_for(&self, account_id: &str) -> LedgerResult<Vec<Transaction>> {
        // Reverse insertion order, then a stable sort, keeps ties newest first.
        let mut v = self.read(|t| {
            t.transactions
                .iter()
                .rev()
                .filter(|x| x.account_id == account_id)
                .cloned()
                .collect::<Vec<_>>()
        });
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(v)
    }

    fn pending_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        let mut v = self.read(|t| {
            t.transactions
                .iter()
                .filter(|x| x.status == TransactionStatus::Pending)
                .cloned()
                .collect::<Vec<_>>()
        });
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(v)
    }

    fn resolve_transaction(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
        resolved_at: Timestamp,
    ) -> LedgerResult<bool> {
        Ok(self.write(|t| {
            match t.transactions.iter_mut().find(|x| {
                x.transaction_id == transaction_id && x.status == TransactionStatus::Pending
            }) {
                Some(x) => {
                    x.status = status;
                    x.resolved_at = Some(resolved_at);
                    true
                }
                None => false,
            }
        }))
    }
}

impl EventLog for MemoryLedger {
    fn append_event(&self, event: &LedgerEvent, recorded_at: Timestamp) -> LedgerResult<()> {
        let mut entry = EventLogEntry::new(event, recorded_at)?;
        self.write(|t| {
            entry.id = Some(t.events.len() as i64 + 1);
            t.events.push(entry);
        });
        Ok(())
    }

    fn events_for(&self, entity_id: &str) -> LedgerResult<Vec<EventLogEntry>> {
        Ok(self.read(|t| {
            t.events
                .iter()
                .filter(|e| e.entity_id == entity_id)
                .cloned()
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::new_id;
    use chrono::{TimeZone, Utc};

    fn account(id: &str) -> Account {
        Account {
            account_id: id.into(),
            display_name: "Test".into(),
            total_realized_profit: 0.0,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn failed_unit_restores_every_table() {
        let store = MemoryLedger::new();
        store.insert_account(&account("a1")).unwrap();

        let result: LedgerResult<()> = store.atomic(|| {
            store.add_realized_profit("a1", 10.0)?;
            store.insert_account(&account(&new_id()))?;
            Err(LedgerError::validation("boom"))
        });

        assert!(result.is_err());
        assert_eq!(store.accounts().unwrap().len(), 1);
        assert_eq!(store.account("a1").unwrap().unwrap().total_realized_profit, 0.0);
    }

    #[test]
    fn failed_unit_drops_only_its_own_events() {
        let store = MemoryLedger::new();
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let denied = |id: &str| LedgerEvent::TransactionDenied { transaction_id: id.into() };
        store.append_event(&denied("t1"), now).unwrap();

        let result: LedgerResult<()> = store.atomic(|| {
            store.append_event(&denied("t1"), now)?;
            store.append_event(&denied("t2"), now)?;
            Err(LedgerError::validation("boom"))
        });

        assert!(result.is_err());
        assert_eq!(store.events_for("t1").unwrap().len(), 1);
        assert!(store.events_for("t2").unwrap().is_empty());

        store.append_event(&denied("t2"), now).unwrap();
        assert_eq!(store.events_for("t2").unwrap().len(), 1);
    }

    #[test]
    fn nested_unit_joins_outer() {
        let store = MemoryLedger::new();
        store.insert_account(&account("a1")).unwrap();

        let result: LedgerResult<()> = store.atomic(|| {
            store.atomic(|| store.add_realized_profit("a1", 5.0).map(|_| ()))?;
            Err(LedgerError::validation("outer fails"))
        });

        assert!(result.is_err());
        assert_eq!(store.account("a1").unwrap().unwrap().total_realized_profit, 0.0);
    }

    #[test]
    fn resolve_is_write_once() {
        let store = MemoryLedger::new();
        store.insert_account(&account("a1")).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let txn = Transaction {
            transaction_id: "t1".into(),
            account_id: "a1".into(),
            investment_id: None,
            amount: 1_000.0,
            kind: crate::model::TransactionKind::Deposit,
            status: TransactionStatus::Pending,
            plan: Some(crate::model::PlanTier::Gold),
            term: Some(crate::model::LockTerm::Months6),
            destination_address: None,
            funding_wallet: None,
            created_at: now,
            resolved_at: None,
        };
        store.insert_transaction(&txn).unwrap();

        assert!(store.resolve_transaction("t1", TransactionStatus::Denied, now).unwrap());
        assert!(!store.resolve_transaction("t1", TransactionStatus::Approved, now).unwrap());
        assert_eq!(
            store.transaction("t1").unwrap().unwrap().status,
            TransactionStatus::Denied
        );
    }
}
