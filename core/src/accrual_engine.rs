//! Accrual Engine — compounds one period of yield into every active investment.
//!
//! A cycle is a pure function of `now` over the store:
//!   profit   = position * (annual_yield_rate / 100) / 365 * (interval / 24h)
//!   position += profit, and the owner's realized profit += profit
//!
//! RULES:
//!   - Each investment is updated in its own atomic unit. One failure is
//!     logged and the cycle moves on.
//!   - An investment accrues at most once per period: the write is guarded
//!     by `last_accrual_at < period_start`, so re-running a cycle is safe.
//!   - Position and realized profit move together or not at all.

use crate::{
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    schedule::AccrualSchedule,
    store::{LedgerStore, MAX_WRITE_ATTEMPTS},
    types::{InvestmentId, Money, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualReport {
    pub ran_at: Timestamp,
    pub period_start: Timestamp,
    pub applied: usize,
    /// Already accrued this period, or no longer active.
    pub skipped: usize,
    pub failed: Vec<InvestmentId>,
    pub total_profit: Money,
}

pub struct AccrualEngine<S: LedgerStore> {
    store: Arc<S>,
    schedule: AccrualSchedule,
}

impl<S: LedgerStore> AccrualEngine<S> {
    pub fn new(store: Arc<S>, schedule: AccrualSchedule) -> Self {
        Self { store, schedule }
    }

    pub fn schedule(&self) -> &AccrualSchedule {
        &self.schedule
    }

    /// Fails only if the set of active investments cannot be read at all.
    pub fn run_cycle(&self, now: Timestamp) -> LedgerResult<AccrualReport> {
        let period_start = self.schedule.period_start(now);
        let candidates = self.store.active_investments()?;
        log::info!(
            "accrual cycle at {now} (period {period_start}): {} active investments",
            candidates.len()
        );

        let mut report = AccrualReport {
            ran_at: now,
            period_start,
            applied: 0,
            skipped: 0,
            failed: Vec::new(),
            total_profit: 0.0,
        };

        for inv in candidates {
            match self.accrue_one(&inv.investment_id, now, period_start) {
                Ok(Some(profit)) => {
                    report.applied += 1;
                    report.total_profit += profit;
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    log::error!("accrual failed for investment {}: {e}", inv.investment_id);
                    report.failed.push(inv.investment_id);
                }
            }
        }

        let summary = LedgerEvent::AccrualCycleCompleted {
            applied: report.applied,
            skipped: report.skipped,
            failed: report.failed.len(),
            total_profit: report.total_profit,
        };
        if let Err(e) = self.store.append_event(&summary, now) {
            log::warn!("could not record accrual summary: {e}");
        }
        log::info!(
            "accrual cycle done: applied={} skipped={} failed={} profit=${:.2}",
            report.applied,
            report.skipped,
            report.failed.len(),
            report.total_profit
        );
        Ok(report)
    }

    /// `Some(profit)` when applied, `None` when this period is already done.
    fn accrue_one(
        &self,
        investment_id: &str,
        now: Timestamp,
        period_start: Timestamp,
    ) -> LedgerResult<Option<Money>> {
        self.store.atomic(|| {
            for _ in 0..MAX_WRITE_ATTEMPTS {
                let Some(inv) = self.store.investment(investment_id)? else {
                    return Ok(None);
                };
                if !inv.is_active() || inv.last_accrual_at >= period_start {
                    return Ok(None);
                }

                let profit = inv.period_profit(self.schedule.interval());
                if !profit.is_finite() || profit < 0.0 {
                    return Err(LedgerError::InvariantViolation {
                        investment_id: inv.investment_id,
                        balance: inv.principal_plus_accrued,
                        requested: profit,
                    });
                }

                if !self
                    .store
                    .record_accrual(investment_id, inv.version, profit, now, period_start)?
                {
                    log::debug!("version conflict accruing {investment_id}, retrying");
                    continue;
                }
                if !self.store.add_realized_profit(&inv.account_id, profit)? {
                    return Err(LedgerError::not_found("account", inv.account_id));
                }
                self.store.append_event(
                    &LedgerEvent::ProfitAccrued {
                        investment_id: inv.investment_id,
                        account_id: inv.account_id,
                        profit,
                        position: inv.principal_plus_accrued + profit,
                    },
                    now,
                )?;
                return Ok(Some(profit));
            }
            Err(LedgerError::Contention {
                investment_id: investment_id.to_string(),
                attempts: MAX_WRITE_ATTEMPTS,
            })
        })
    }
}
