//! Approval Gateway — resolves one pending transaction per call.
//!
//! RULES:
//!   - The `pending -> approved|denied` conditional write is the single
//!     serialization point. Whoever loses it gets `Concurrency` and
//!     applies nothing.
//!   - Resolution and its financial effect commit as one unit. Any failure
//!     rolls both back and the transaction stays `pending` (retryable).
//!   - A position is never driven below zero. A withdrawal larger than the
//!     position fails with `InvariantViolation`; it is never clamped.

use crate::{
    clock::LedgerClock,
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    model::{Investment, InvestmentStatus, Transaction, TransactionKind, TransactionStatus},
    notify::{NoticeKind, Notifier},
    request_processor::notice_for,
    store::{LedgerStore, MAX_WRITE_ATTEMPTS},
    types::{new_id, Timestamp, MONEY_EPSILON},
};
use chrono::Months;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub transaction: Transaction,
    /// The investment as left by the approval.
    pub investment: Investment,
}

pub struct ApprovalGateway<S: LedgerStore> {
    store: Arc<S>,
    config: Arc<LedgerConfig>,
    clock: Arc<dyn LedgerClock>,
    notifier: Arc<dyn Notifier>,
}

impl<S: LedgerStore> ApprovalGateway<S> {
    pub fn new(
        store: Arc<S>,
        config: Arc<LedgerConfig>,
        clock: Arc<dyn LedgerClock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { store, config, clock, notifier }
    }

    pub fn approve(&self, transaction_id: &str) -> LedgerResult<ApprovalOutcome> {
        let now = self.clock.now();
        let result = self.store.atomic(|| {
            let txn = self.load_pending(transaction_id)?;
            self.claim(&txn, TransactionStatus::Approved, now)?;

            let investment = match (txn.kind, txn.investment_id.as_deref()) {
                (TransactionKind::Deposit, None) => self.open_investment(&txn, now)?,
                (TransactionKind::Deposit, Some(target)) => self.top_up(&txn, target, now)?,
                (TransactionKind::Withdrawal, Some(target)) => self.withdraw(&txn, target, now)?,
                (TransactionKind::Withdrawal, None) => {
                    return Err(LedgerError::validation(format!(
                        "withdrawal {transaction_id} has no investment"
                    )));
                }
            };

            self.store.append_event(
                &LedgerEvent::TransactionApproved {
                    transaction_id: txn.transaction_id.clone(),
                    investment_id: investment.investment_id.clone(),
                },
                now,
            )?;
            let transaction = Transaction {
                status: TransactionStatus::Approved,
                resolved_at: Some(now),
                ..txn
            };
            Ok(ApprovalOutcome { transaction, investment })
        });

        match &result {
            Ok(outcome) => {
                log::info!(
                    "approved {} {}: ${:.2} -> investment {} (${:.2}, {})",
                    outcome.transaction.kind.as_str(),
                    transaction_id,
                    outcome.transaction.amount,
                    outcome.investment.investment_id,
                    outcome.investment.principal_plus_accrued,
                    outcome.investment.status.as_str()
                );
                self.notify(NoticeKind::TransactionApproved, &outcome.transaction);
            }
            Err(e @ LedgerError::InvariantViolation { .. }) => {
                log::error!("INVARIANT VIOLATION approving {transaction_id}: {e}");
            }
            Err(e) => log::warn!("approval of {transaction_id} failed: {e}"),
        }
        result
    }

    pub fn deny(&self, transaction_id: &str) -> LedgerResult<Transaction> {
        let now = self.clock.now();
        let txn = self.store.atomic(|| {
            let txn = self.load_pending(transaction_id)?;
            self.claim(&txn, TransactionStatus::Denied, now)?;
            self.store.append_event(
                &LedgerEvent::TransactionDenied {
                    transaction_id: txn.transaction_id.clone(),
                },
                now,
            )?;
            Ok(Transaction {
                status: TransactionStatus::Denied,
                resolved_at: Some(now),
                ..txn
            })
        })?;
        log::info!("denied {} {}", txn.kind.as_str(), transaction_id);
        self.notify(NoticeKind::TransactionDenied, &txn);
        Ok(txn)
    }

    fn load_pending(&self, transaction_id: &str) -> LedgerResult<Transaction> {
        let txn = self
            .store
            .transaction(transaction_id)?
            .ok_or_else(|| LedgerError::not_found("transaction", transaction_id))?;
        if txn.status.is_terminal() {
            return Err(LedgerError::Concurrency {
                transaction_id: transaction_id.to_string(),
                status: txn.status.to_string(),
            });
        }
        Ok(txn)
    }

    /// Conditional `pending -> status`. Losing the race is a `Concurrency` error.
    fn claim(&self, txn: &Transaction, status: TransactionStatus, now: Timestamp) -> LedgerResult<()> {
        if self.store.resolve_transaction(&txn.transaction_id, status, now)? {
            return Ok(());
        }
        let current = self
            .store
            .transaction(&txn.transaction_id)?
            .map(|t| t.status.to_string())
            .unwrap_or_else(|| "unknown".into());
        Err(LedgerError::Concurrency {
            transaction_id: txn.transaction_id.clone(),
            status: current,
        })
    }

    fn open_investment(&self, txn: &Transaction, now: Timestamp) -> LedgerResult<Investment> {
        let (plan, term) = match (txn.plan, txn.term) {
            (Some(plan), Some(term)) => (plan, term),
            _ => {
                return Err(LedgerError::validation(format!(
                    "deposit {} carries no plan and term",
                    txn.transaction_id
                )))
            }
        };
        let lock_expires_at = now
            .checked_add_months(Months::new(term.months()))
            .ok_or_else(|| LedgerError::validation(format!("lock expiry overflows for {term}")))?;

        let investment = Investment {
            investment_id: new_id(),
            account_id: txn.account_id.clone(),
            principal_plus_accrued: txn.amount,
            plan,
            term,
            annual_yield_rate: self.config.plan(plan)?.annual_yield_rate,
            ceiling_amount: self.config.term(term)?.ceiling_amount,
            created_at: now,
            lock_expires_at,
            last_accrual_at: now,
            status: InvestmentStatus::Active,
            version: 0,
        };
        self.store.insert_investment(&investment)?;
        self.store.append_event(
            &LedgerEvent::InvestmentOpened {
                investment_id: investment.investment_id.clone(),
                account_id: investment.account_id.clone(),
                amount: investment.principal_plus_accrued,
                plan,
                term,
                lock_expires_at,
            },
            now,
        )?;
        Ok(investment)
    }

    fn top_up(&self, txn: &Transaction, target: &str, now: Timestamp) -> LedgerResult<Investment> {
        let inv = self.active_investment(target)?;
        let projected = inv.principal_plus_accrued + txn.amount;
        if self.config.enforce_top_up_ceiling && projected > inv.ceiling_amount + MONEY_EPSILON {
            return Err(LedgerError::validation(format!(
                "top-up would take investment {target} to ${projected:.2}, above its ${:.2} ceiling",
                inv.ceiling_amount
            )));
        }
        if !self.store.increment_position(target, txn.amount)? {
            return Err(LedgerError::not_found("investment", target));
        }
        self.store.append_event(
            &LedgerEvent::InvestmentToppedUp {
                investment_id: target.to_string(),
                amount: txn.amount,
            },
            now,
        )?;
        self.active_investment(target)
    }

    fn withdraw(&self, txn: &Transaction, target: &str, now: Timestamp) -> LedgerResult<Investment> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let inv = self.active_investment(target)?;
            // Maturity is re-checked: lock expiry is immutable, but the
            // request may have been forged or replayed.
            if !inv.is_mature(now) {
                return Err(LedgerError::LockViolation {
                    investment_id: inv.investment_id,
                    lock_expires_at: inv.lock_expires_at,
                });
            }

            let remaining = inv.principal_plus_accrued - txn.amount;
            if remaining < -MONEY_EPSILON {
                return Err(LedgerError::InvariantViolation {
                    investment_id: inv.investment_id,
                    balance: inv.principal_plus_accrued,
                    requested: txn.amount,
                });
            }
            let (position, status) = if remaining <= MONEY_EPSILON {
                (0.0, InvestmentStatus::Closed)
            } else {
                (remaining, InvestmentStatus::Active)
            };

            if !self.store.write_position(target, inv.version, position, status)? {
                log::debug!("version conflict on investment {target}, retrying");
                continue;
            }

            self.store.append_event(
                &LedgerEvent::InvestmentWithdrawn {
                    investment_id: target.to_string(),
                    amount: txn.amount,
                    remaining: position,
                },
                now,
            )?;
            if status == InvestmentStatus::Closed {
                self.store.append_event(
                    &LedgerEvent::InvestmentClosed {
                        investment_id: target.to_string(),
                    },
                    now,
                )?;
            }
            return Ok(Investment {
                principal_plus_accrued: position,
                status,
                version: inv.version + 1,
                ..inv
            });
        }
        Err(LedgerError::Contention {
            investment_id: target.to_string(),
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    fn active_investment(&self, investment_id: &str) -> LedgerResult<Investment> {
        self.store
            .investment(investment_id)?
            .filter(Investment::is_active)
            .ok_or_else(|| LedgerError::not_found("investment", investment_id))
    }

    fn notify(&self, kind: NoticeKind, txn: &Transaction) {
        match self.store.account(&txn.account_id) {
            Ok(Some(account)) => self.notifier.notify(notice_for(kind, txn, &account)),
            Ok(None) => log::warn!("no account {} for notice", txn.account_id),
            Err(e) => log::warn!("notice for {} skipped: {e}", txn.transaction_id),
        }
    }
}
