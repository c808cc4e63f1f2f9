//! Approval and denial: exactly-once resolution, effects, rollback, notices.

use aureus_core::{
    clock::{LedgerClock, ManualClock},
    config::LedgerConfig,
    error::LedgerError,
    model::{InvestmentStatus, LockTerm, PlanTier, TransactionStatus},
    notify::{Notice, NoticeKind, Notifier},
    request_processor::{DepositRequest, WithdrawalRequest},
    store::SqliteLedger,
    Ledger,
};
use chrono::{Months, TimeZone, Utc};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Recorder(Mutex<Vec<Notice>>);

impl Notifier for Recorder {
    fn notify(&self, notice: Notice) {
        self.0.lock().unwrap().push(notice);
    }
}

impl Recorder {
    fn kinds(&self) -> Vec<NoticeKind> {
        self.0.lock().unwrap().iter().map(|n| n.kind).collect()
    }
}

fn build(config: LedgerConfig) -> (Arc<ManualClock>, Arc<Recorder>, Ledger<SqliteLedger>, String) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 31, 10, 0, 0).unwrap()));
    let notices = Arc::new(Recorder::default());
    let store = SqliteLedger::in_memory().expect("store");
    store.migrate().expect("migration");
    let ledger = Ledger::new(Arc::new(store), config, clock.clone(), notices.clone()).expect("ledger");
    let acct = ledger.register_account("Ada Lovelace").expect("account").account_id;
    (clock, notices, ledger, acct)
}

fn setup() -> (Arc<ManualClock>, Arc<Recorder>, Ledger<SqliteLedger>, String) {
    build(LedgerConfig::default())
}

fn new_deposit(ledger: &Ledger<SqliteLedger>, acct: &str, amount: f64, plan: PlanTier, term: LockTerm) -> String {
    ledger
        .submit_deposit(DepositRequest {
            account_id: acct.into(),
            amount,
            plan: Some(plan),
            term: Some(term),
            investment_id: None,
            funding_wallet: None,
        })
        .unwrap()
        .transaction_id
}

fn top_up(ledger: &Ledger<SqliteLedger>, acct: &str, investment_id: &str, amount: f64) -> String {
    ledger
        .submit_deposit(DepositRequest {
            account_id: acct.into(),
            amount,
            plan: None,
            term: None,
            investment_id: Some(investment_id.into()),
            funding_wallet: None,
        })
        .unwrap()
        .transaction_id
}

fn withdrawal(ledger: &Ledger<SqliteLedger>, acct: &str, investment_id: &str) -> String {
    ledger
        .submit_withdrawal(WithdrawalRequest {
            account_id: acct.into(),
            investment_id: investment_id.into(),
            destination_address: "0xfeed".into(),
        })
        .unwrap()
        .transaction_id
}

#[test]
fn approving_a_deposit_opens_an_investment() {
    let (clock, _n, ledger, acct) = setup();
    let txn = new_deposit(&ledger, &acct, 7_500.0, PlanTier::Diamond, LockTerm::Months12);

    let outcome = ledger.approve_transaction(&txn).unwrap();
    let inv = &outcome.investment;
    assert_eq!(outcome.transaction.status, TransactionStatus::Approved);
    assert_eq!(outcome.transaction.resolved_at, Some(clock.now()));
    assert_eq!(inv.principal_plus_accrued, 7_500.0);
    assert_eq!(inv.annual_yield_rate, 40.0);
    assert_eq!(inv.ceiling_amount, 50_000.0);
    assert_eq!(inv.status, InvestmentStatus::Active);
    assert_eq!(inv.created_at, clock.now());
    assert_eq!(inv.lock_expires_at, inv.created_at.checked_add_months(Months::new(12)).unwrap());

    assert_eq!(ledger.investment(&inv.investment_id).unwrap(), *inv);
    assert_eq!(ledger.transaction(&txn).unwrap().status, TransactionStatus::Approved);
    assert!(ledger.list_pending_transactions().unwrap().is_empty());
}

#[test]
fn lock_expiry_clamps_to_month_end() {
    // Opened on Jan 31: three months later clamps to April 30.
    let (_clock, _n, ledger, acct) = setup();
    let txn = new_deposit(&ledger, &acct, 1_000.0, PlanTier::Silver, LockTerm::Months6);
    let inv = ledger.approve_transaction(&txn).unwrap().investment;
    assert_eq!(inv.lock_expires_at, Utc.with_ymd_and_hms(2026, 7, 31, 10, 0, 0).unwrap());

    let txn = new_deposit(&ledger, &acct, 1_000.0, PlanTier::Silver, LockTerm::Months3);
    let inv = ledger.approve_transaction(&txn).unwrap().investment;
    assert_eq!(inv.lock_expires_at, Utc.with_ymd_and_hms(2026, 4, 30, 10, 0, 0).unwrap());
}

#[test]
fn second_approval_is_a_concurrency_error_with_no_effect() {
    let (_clock, _n, ledger, acct) = setup();
    let txn = new_deposit(&ledger, &acct, 5_000.0, PlanTier::Gold, LockTerm::Months6);
    ledger.approve_transaction(&txn).unwrap();

    let err = ledger.approve_transaction(&txn).unwrap_err();
    assert!(matches!(err, LedgerError::Concurrency { .. }), "got {err:?}");
    assert!(!err.is_retryable());

    let active = ledger.list_active_investments(&acct).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].principal_plus_accrued, 5_000.0);
}

#[test]
fn denial_is_terminal_and_moves_no_money() {
    let (_clock, notices, ledger, acct) = setup();
    let txn = new_deposit(&ledger, &acct, 5_000.0, PlanTier::Gold, LockTerm::Months6);

    let denied = ledger.deny_transaction(&txn).unwrap();
    assert_eq!(denied.status, TransactionStatus::Denied);
    assert!(ledger.list_active_investments(&acct).unwrap().is_empty());

    assert!(matches!(ledger.approve_transaction(&txn), Err(LedgerError::Concurrency { .. })));
    assert!(matches!(ledger.deny_transaction(&txn), Err(LedgerError::Concurrency { .. })));
    assert_eq!(
        notices.kinds(),
        vec![NoticeKind::DepositRequested, NoticeKind::TransactionDenied]
    );
}

#[test]
fn unknown_transaction_is_not_found() {
    let (_clock, _n, ledger, _acct) = setup();
    assert!(matches!(
        ledger.approve_transaction("missing"),
        Err(LedgerError::NotFound { entity: "transaction", .. })
    ));
    assert!(matches!(
        ledger.deny_transaction("missing"),
        Err(LedgerError::NotFound { entity: "transaction", .. })
    ));
}

#[test]
fn top_up_increments_the_position() {
    let (_clock, notices, ledger, acct) = setup();
    let txn = new_deposit(&ledger, &acct, 2_000.0, PlanTier::Gold, LockTerm::Months6);
    let inv = ledger.approve_transaction(&txn).unwrap().investment;

    let up = top_up(&ledger, &acct, &inv.investment_id, 750.0);
    let outcome = ledger.approve_transaction(&up).unwrap();
    assert_eq!(outcome.investment.investment_id, inv.investment_id);
    assert_eq!(outcome.investment.principal_plus_accrued, 2_750.0);
    assert_eq!(outcome.investment.lock_expires_at, inv.lock_expires_at);
    assert_eq!(outcome.investment.plan, PlanTier::Gold);
    assert_eq!(ledger.list_active_investments(&acct).unwrap().len(), 1);
    assert!(notices.kinds().contains(&NoticeKind::TopUpRequested));
}

#[test]
fn enforced_ceiling_rejects_oversized_top_up() {
    let config = LedgerConfig {
        enforce_top_up_ceiling: true,
        ..LedgerConfig::default()
    };
    let (_clock, _n, ledger, acct) = build(config);
    let txn = new_deposit(&ledger, &acct, 10_000.0, PlanTier::Gold, LockTerm::Months6);
    let inv = ledger.approve_transaction(&txn).unwrap().investment;

    let err = ledger
        .submit_deposit(DepositRequest {
            account_id: acct.clone(),
            amount: 40_000.01,
            plan: None,
            term: None,
            investment_id: Some(inv.investment_id.clone()),
            funding_wallet: None,
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));

    // Exactly at the ceiling is fine.
    let up = top_up(&ledger, &acct, &inv.investment_id, 40_000.0);
    let outcome = ledger.approve_transaction(&up).unwrap();
    assert_eq!(outcome.investment.principal_plus_accrued, 50_000.0);
}

#[test]
fn withdrawal_closes_the_investment_when_drained() {
    let (clock, notices, ledger, acct) = setup();
    let txn = new_deposit(&ledger, &acct, 3_000.0, PlanTier::Silver, LockTerm::Months3);
    let inv = ledger.approve_transaction(&txn).unwrap().investment;

    clock.set(inv.lock_expires_at);
    let w = withdrawal(&ledger, &acct, &inv.investment_id);
    let outcome = ledger.approve_transaction(&w).unwrap();
    assert_eq!(outcome.investment.status, InvestmentStatus::Closed);
    assert_eq!(outcome.investment.principal_plus_accrued, 0.0);
    assert!(ledger.list_active_investments(&acct).unwrap().is_empty());

    let closed = ledger.investment(&inv.investment_id).unwrap();
    assert_eq!(closed.status, InvestmentStatus::Closed);
    let again = ledger.submit_withdrawal(WithdrawalRequest {
        account_id: acct.clone(),
        investment_id: inv.investment_id.clone(),
        destination_address: "0xfeed".into(),
    });
    assert!(matches!(again, Err(LedgerError::NotFound { entity: "investment", .. })));

    let trail: Vec<_> = ledger
        .events_for(&inv.investment_id)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(trail, vec!["investment_opened", "investment_withdrawn", "investment_closed"]);
    assert_eq!(notices.kinds().last(), Some(&NoticeKind::TransactionApproved));
}

#[test]
fn accrual_between_submission_and_approval_stays_invested() {
    let (clock, _n, ledger, acct) = setup();
    let txn = new_deposit(&ledger, &acct, 10_000.0, PlanTier::Gold, LockTerm::Months6);
    let inv = ledger.approve_transaction(&txn).unwrap().investment;

    clock.set(inv.lock_expires_at);
    let w = withdrawal(&ledger, &acct, &inv.investment_id);
    assert_eq!(ledger.transaction(&w).unwrap().amount, 10_000.0);

    // A cycle lands before the admin gets to the request.
    let next_day = ledger.schedule().next_run_after(clock.now());
    let report = ledger.run_accrual_cycle(next_day).unwrap();
    assert_eq!(report.applied, 1);

    let outcome = ledger.approve_transaction(&w).unwrap();
    let remaining = outcome.investment.principal_plus_accrued;
    assert!((remaining - report.total_profit).abs() < 1e-9);
    assert_eq!(outcome.investment.status, InvestmentStatus::Active);
}

#[test]
fn duplicate_withdrawal_fails_after_close_and_stays_pending() {
    let (clock, _n, ledger, acct) = setup();
    let txn = new_deposit(&ledger, &acct, 3_000.0, PlanTier::Silver, LockTerm::Months3);
    let inv = ledger.approve_transaction(&txn).unwrap().investment;

    clock.set(inv.lock_expires_at);
    let first = withdrawal(&ledger, &acct, &inv.investment_id);
    let second = withdrawal(&ledger, &acct, &inv.investment_id);

    ledger.approve_transaction(&first).unwrap();
    let err = ledger.approve_transaction(&second).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "investment", .. }), "got {err:?}");
    assert_eq!(ledger.transaction(&second).unwrap().status, TransactionStatus::Pending);

    // The admin can still clear it from the queue.
    ledger.deny_transaction(&second).unwrap();
    assert!(ledger.list_pending_transactions().unwrap().is_empty());
}

#[test]
fn approval_trail_links_transaction_and_investment() {
    let (_clock, _n, ledger, acct) = setup();
    let txn = new_deposit(&ledger, &acct, 2_500.0, PlanTier::Gold, LockTerm::Months6);
    let inv = ledger.approve_transaction(&txn).unwrap().investment;

    let trail = ledger.events_for(&txn).unwrap();
    let types: Vec<_> = trail.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["transaction_submitted", "transaction_approved"]);

    let approved = trail[1].decode().unwrap();
    let payload = serde_json::to_value(&approved).unwrap();
    assert_eq!(payload["investment_id"], inv.investment_id.as_str());
}
