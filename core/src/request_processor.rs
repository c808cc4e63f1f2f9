//! Request Processor — admits deposit and withdrawal requests as `pending`.
//!
//! RULE: this component writes transactions and their audit events only.
//! It never touches an investment's position or an account's profit.

use crate::{
    clock::LedgerClock,
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    model::{
        Account, Investment, LockTerm, PlanTier, Transaction, TransactionKind, TransactionStatus,
    },
    notify::{Notice, NoticeKind, Notifier},
    store::LedgerStore,
    types::{new_id, AccountId, InvestmentId, Money, MONEY_EPSILON},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub account_id: AccountId,
    pub amount: Money,
    /// Required for a new investment; inherited from the target on a top-up.
    #[serde(default)]
    pub plan: Option<PlanTier>,
    #[serde(default)]
    pub term: Option<LockTerm>,
    /// Set for a top-up of an existing investment.
    #[serde(default)]
    pub investment_id: Option<InvestmentId>,
    #[serde(default)]
    pub funding_wallet: Option<String>,
}

/// The amount is not part of the request: a withdrawal always takes the
/// whole position as it stands at submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub account_id: AccountId,
    pub investment_id: InvestmentId,
    pub destination_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionRequest {
    Deposit(DepositRequest),
    Withdrawal(WithdrawalRequest),
}

pub struct RequestProcessor<S: LedgerStore> {
    store: Arc<S>,
    config: Arc<LedgerConfig>,
    clock: Arc<dyn LedgerClock>,
    notifier: Arc<dyn Notifier>,
}

impl<S: LedgerStore> RequestProcessor<S> {
    pub fn new(
        store: Arc<S>,
        config: Arc<LedgerConfig>,
        clock: Arc<dyn LedgerClock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { store, config, clock, notifier }
    }

    pub fn submit(&self, request: TransactionRequest) -> LedgerResult<Transaction> {
        match request {
            TransactionRequest::Deposit(r) => self.submit_deposit(r),
            TransactionRequest::Withdrawal(r) => self.submit_withdrawal(r),
        }
    }

    pub fn submit_deposit(&self, req: DepositRequest) -> LedgerResult<Transaction> {
        let now = self.clock.now();
        if !req.amount.is_finite() || req.amount <= 0.0 {
            return Err(LedgerError::validation(format!(
                "deposit amount {} must be a positive number",
                req.amount
            )));
        }
        let account = self.require_account(&req.account_id)?;

        let (plan, term) = match req.investment_id.as_deref() {
            Some(target) => {
                let inv = self.eligible_investment(&req.account_id, target)?;
                self.check_top_up_ceiling(&inv, req.amount)?;
                (inv.plan, inv.term)
            }
            None => {
                let plan = req
                    .plan
                    .ok_or_else(|| LedgerError::validation("a new investment needs a plan"))?;
                let term = req
                    .term
                    .ok_or_else(|| LedgerError::validation("a new investment needs a lock term"))?;
                self.config.plan(plan)?;
                let band = self.config.term(term)?;
                if req.amount < band.min_amount || req.amount > band.max_amount {
                    return Err(LedgerError::validation(format!(
                        "amount must be between ${} and ${} for {term}",
                        band.min_amount, band.max_amount
                    )));
                }
                (plan, term)
            }
        };

        let txn = Transaction {
            transaction_id: new_id(),
            account_id: req.account_id,
            investment_id: req.investment_id,
            amount: req.amount,
            kind: TransactionKind::Deposit,
            status: TransactionStatus::Pending,
            plan: Some(plan),
            term: Some(term),
            destination_address: None,
            funding_wallet: req.funding_wallet,
            created_at: now,
            resolved_at: None,
        };
        self.admit(&txn)?;

        let kind = if txn.is_top_up() {
            NoticeKind::TopUpRequested
        } else {
            NoticeKind::DepositRequested
        };
        self.notifier.notify(notice_for(kind, &txn, &account));
        Ok(txn)
    }

    pub fn submit_withdrawal(&self, req: WithdrawalRequest) -> LedgerResult<Transaction> {
        let now = self.clock.now();
        let destination = req.destination_address.trim();
        if destination.is_empty() {
            return Err(LedgerError::validation("a withdrawal needs a destination address"));
        }
        let account = self.require_account(&req.account_id)?;
        let inv = self.eligible_investment(&req.account_id, &req.investment_id)?;

        // Immature capital can never be queued for release.
        if !inv.is_mature(now) {
            log::info!(
                "withdrawal rejected: investment {} locked until {}",
                inv.investment_id,
                inv.lock_expires_at
            );
            return Err(LedgerError::LockViolation {
                investment_id: inv.investment_id,
                lock_expires_at: inv.lock_expires_at,
            });
        }
        if inv.principal_plus_accrued <= MONEY_EPSILON {
            return Err(LedgerError::validation(format!(
                "investment {} has nothing to withdraw",
                inv.investment_id
            )));
        }

        let txn = Transaction {
            transaction_id: new_id(),
            account_id: req.account_id,
            investment_id: Some(inv.investment_id),
            amount: inv.principal_plus_accrued,
            kind: TransactionKind::Withdrawal,
            status: TransactionStatus::Pending,
            plan: None,
            term: None,
            destination_address: Some(destination.to_string()),
            funding_wallet: None,
            created_at: now,
            resolved_at: None,
        };
        self.admit(&txn)?;

        self.notifier
            .notify(notice_for(NoticeKind::WithdrawalRequested, &txn, &account));
        Ok(txn)
    }

    fn admit(&self, txn: &Transaction) -> LedgerResult<()> {
        self.store.atomic(|| {
            self.store.insert_transaction(txn)?;
            self.store.append_event(
                &LedgerEvent::TransactionSubmitted {
                    transaction_id: txn.transaction_id.clone(),
                    account_id: txn.account_id.clone(),
                    investment_id: txn.investment_id.clone(),
                    kind: txn.kind,
                    amount: txn.amount,
                },
                txn.created_at,
            )
        })?;
        log::info!(
            "{} {} admitted for account {}: ${:.2}",
            txn.kind.as_str(),
            txn.transaction_id,
            txn.account_id,
            txn.amount
        );
        Ok(())
    }

    fn require_account(&self, account_id: &str) -> LedgerResult<Account> {
        self.store
            .account(account_id)?
            .ok_or_else(|| LedgerError::not_found("account", account_id))
    }

    /// An active investment owned by `account_id`. Anything else is reported
    /// as not found: closed investments are not valid targets.
    fn eligible_investment(&self, account_id: &str, investment_id: &str) -> LedgerResult<Investment> {
        self.store
            .investment(investment_id)?
            .filter(|inv| inv.account_id == account_id && inv.is_active())
            .ok_or_else(|| LedgerError::not_found("investment", investment_id))
    }

    fn check_top_up_ceiling(&self, inv: &Investment, amount: Money) -> LedgerResult<()> {
        let projected = inv.principal_plus_accrued + amount;
        if projected <= inv.ceiling_amount + MONEY_EPSILON {
            return Ok(());
        }
        if self.config.enforce_top_up_ceiling {
            return Err(LedgerError::validation(format!(
                "top-up would take investment {} to ${projected:.2}, above its ${:.2} ceiling",
                inv.investment_id, inv.ceiling_amount
            )));
        }
        log::warn!(
            "top-up takes investment {} to ${projected:.2}, above its ${:.2} ceiling",
            inv.investment_id,
            inv.ceiling_amount
        );
        Ok(())
    }
}

pub(crate) fn notice_for(kind: NoticeKind, txn: &Transaction, account: &Account) -> Notice {
    Notice {
        kind,
        transaction_id: txn.transaction_id.clone(),
        account_id: txn.account_id.clone(),
        account_name: account.display_name.clone(),
        transaction_kind: txn.kind,
        amount: txn.amount,
        plan: txn.plan,
        destination_address: txn.destination_address.clone(),
    }
}
