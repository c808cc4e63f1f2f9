//! The ledger facade — the one entry point callers hold.
//!
//! Wires the three components over a shared store, config, clock and
//! notifier:
//!   - Request Processor  admits deposits and withdrawals as `pending`
//!   - Approval Gateway   resolves them and applies their effect
//!   - Accrual Engine     compounds yield once per period
//!
//! Reads go straight to the store. Every write goes through a component.

use crate::{
    accrual_engine::{AccrualEngine, AccrualReport},
    approval_gateway::{ApprovalGateway, ApprovalOutcome},
    clock::LedgerClock,
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    event::EventLogEntry,
    model::{Account, Investment, Transaction},
    notify::{LogNotifier, Notifier},
    request_processor::{DepositRequest, RequestProcessor, TransactionRequest, WithdrawalRequest},
    schedule::AccrualSchedule,
    store::{LedgerStore, SqliteLedger},
    types::{new_id, Timestamp},
};
use std::sync::Arc;

pub struct Ledger<S: LedgerStore> {
    store: Arc<S>,
    config: Arc<LedgerConfig>,
    clock: Arc<dyn LedgerClock>,
    requests: RequestProcessor<S>,
    approvals: ApprovalGateway<S>,
    accrual: AccrualEngine<S>,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(
        store: Arc<S>,
        config: LedgerConfig,
        clock: Arc<dyn LedgerClock>,
        notifier: Arc<dyn Notifier>,
    ) -> LedgerResult<Self> {
        config.validate()?;
        let schedule = AccrualSchedule::from_config(&config.accrual)?;
        let config = Arc::new(config);
        Ok(Self {
            requests: RequestProcessor::new(
                store.clone(),
                config.clone(),
                clock.clone(),
                notifier.clone(),
            ),
            approvals: ApprovalGateway::new(store.clone(), config.clone(), clock.clone(), notifier),
            accrual: AccrualEngine::new(store.clone(), schedule),
            store,
            config,
            clock,
        })
    }

    // ── Accounts ─────────────────────────────────────────────────────────

    pub fn register_account(&self, display_name: &str) -> LedgerResult<Account> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(LedgerError::validation("an account needs a display name"));
        }
        let account = Account {
            account_id: new_id(),
            display_name: display_name.to_string(),
            total_realized_profit: 0.0,
            created_at: self.clock.now(),
        };
        self.store.insert_account(&account)?;
        log::info!("registered account {} ({})", account.account_id, account.display_name);
        Ok(account)
    }

    pub fn account(&self, account_id: &str) -> LedgerResult<Account> {
        self.store
            .account(account_id)?
            .ok_or_else(|| LedgerError::not_found("account", account_id))
    }

    pub fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        self.store.accounts()
    }

    // ── Requests and approval ────────────────────────────────────────────

    pub fn submit_transaction(&self, request: TransactionRequest) -> LedgerResult<Transaction> {
        self.requests.submit(request)
    }

    pub fn submit_deposit(&self, request: DepositRequest) -> LedgerResult<Transaction> {
        self.requests.submit_deposit(request)
    }

    pub fn submit_withdrawal(&self, request: WithdrawalRequest) -> LedgerResult<Transaction> {
        self.requests.submit_withdrawal(request)
    }

    pub fn approve_transaction(&self, transaction_id: &str) -> LedgerResult<ApprovalOutcome> {
        self.approvals.approve(transaction_id)
    }

    pub fn deny_transaction(&self, transaction_id: &str) -> LedgerResult<Transaction> {
        self.approvals.deny(transaction_id)
    }

    // ── Reads ────────────────────────────────────────────────────────────

    /// Newest first.
    pub fn list_active_investments(&self, account_id: &str) -> LedgerResult<Vec<Investment>> {
        self.store.active_investments_for(account_id)
    }

    /// Newest first.
    pub fn list_transactions(&self, account_id: &str) -> LedgerResult<Vec<Transaction>> {
        self.store.transactions_for(account_id)
    }

    /// The admin approval queue, oldest first.
    pub fn list_pending_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        self.store.pending_transactions()
    }

    pub fn investment(&self, investment_id: &str) -> LedgerResult<Investment> {
        self.store
            .investment(investment_id)?
            .ok_or_else(|| LedgerError::not_found("investment", investment_id))
    }

    pub fn transaction(&self, transaction_id: &str) -> LedgerResult<Transaction> {
        self.store
            .transaction(transaction_id)?
            .ok_or_else(|| LedgerError::not_found("transaction", transaction_id))
    }

    /// Audit trail for one account, investment or transaction, oldest first.
    pub fn events_for(&self, entity_id: &str) -> LedgerResult<Vec<EventLogEntry>> {
        self.store.events_for(entity_id)
    }

    // ── Accrual ──────────────────────────────────────────────────────────

    /// Run one accrual cycle as of `now`. Safe to call again within a period.
    pub fn run_accrual_cycle(&self, now: Timestamp) -> LedgerResult<AccrualReport> {
        self.accrual.run_cycle(now)
    }

    /// Run one accrual cycle as of the ledger clock.
    pub fn run_accrual_now(&self) -> LedgerResult<AccrualReport> {
        self.accrual.run_cycle(self.clock.now())
    }

    pub fn schedule(&self) -> &AccrualSchedule {
        self.accrual.schedule()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn LedgerClock> {
        self.clock.clone()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl Ledger<SqliteLedger> {
    /// Migrated in-memory database with the default catalogue and a
    /// logging notifier (used in tests).
    pub fn in_memory(clock: Arc<dyn LedgerClock>) -> LedgerResult<Self> {
        let store = SqliteLedger::in_memory()?;
        store.migrate()?;
        Self::new(Arc::new(store), LedgerConfig::default(), clock, Arc::new(LogNotifier))
    }

    /// Open (and migrate) the database at `path`.
    pub fn open(
        path: &str,
        config: LedgerConfig,
        clock: Arc<dyn LedgerClock>,
        notifier: Arc<dyn Notifier>,
    ) -> LedgerResult<Self> {
        let store = SqliteLedger::open(path)?;
        store.migrate()?;
        Self::new(Arc::new(store), config, clock, notifier)
    }
}
