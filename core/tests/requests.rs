//! Request admission: validation, ownership, lock enforcement at submission.

use aureus_core::{
    clock::ManualClock,
    error::LedgerError,
    model::{LockTerm, PlanTier, TransactionKind, TransactionStatus},
    request_processor::{DepositRequest, TransactionRequest, WithdrawalRequest},
    store::SqliteLedger,
    Ledger,
};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

fn setup() -> (Arc<ManualClock>, Ledger<SqliteLedger>, String) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap()));
    let ledger = Ledger::in_memory(clock.clone()).expect("ledger");
    let account = ledger.register_account("Ada Lovelace").expect("account");
    (clock, ledger, account.account_id)
}

fn deposit(account_id: &str, amount: f64, plan: PlanTier, term: LockTerm) -> DepositRequest {
    DepositRequest {
        account_id: account_id.into(),
        amount,
        plan: Some(plan),
        term: Some(term),
        investment_id: None,
        funding_wallet: Some("bc1q-platform-btc".into()),
    }
}

fn top_up(account_id: &str, investment_id: &str, amount: f64) -> DepositRequest {
    DepositRequest {
        account_id: account_id.into(),
        amount,
        plan: None,
        term: None,
        investment_id: Some(investment_id.into()),
        funding_wallet: None,
    }
}

fn open_investment(ledger: &Ledger<SqliteLedger>, account_id: &str, amount: f64) -> String {
    let txn = ledger
        .submit_deposit(deposit(account_id, amount, PlanTier::Gold, LockTerm::Months6))
        .unwrap();
    ledger.approve_transaction(&txn.transaction_id).unwrap().investment.investment_id
}

#[test]
fn deposit_within_band_is_admitted_as_pending() {
    let (_clock, ledger, acct) = setup();
    let txn = ledger
        .submit_deposit(deposit(&acct, 5_000.0, PlanTier::Gold, LockTerm::Months6))
        .unwrap();

    assert_eq!(txn.status, TransactionStatus::Pending);
    assert_eq!(txn.kind, TransactionKind::Deposit);
    assert_eq!(txn.plan, Some(PlanTier::Gold));
    assert_eq!(txn.funding_wallet.as_deref(), Some("bc1q-platform-btc"));

    let stored = ledger.transaction(&txn.transaction_id).unwrap();
    assert_eq!(stored, txn);
    assert_eq!(ledger.list_pending_transactions().unwrap().len(), 1);
}

#[test]
fn band_edges_are_inclusive() {
    let (_clock, ledger, acct) = setup();
    for (amount, term) in [
        (500.0, LockTerm::Months3),
        (5_000.0, LockTerm::Months3),
        (1_000.0, LockTerm::Months6),
        (50_000.0, LockTerm::Months12),
    ] {
        ledger
            .submit_deposit(deposit(&acct, amount, PlanTier::Silver, term))
            .unwrap_or_else(|e| panic!("{amount} for {term} rejected: {e}"));
    }
}

#[test]
fn deposit_outside_band_creates_nothing() {
    let (_clock, ledger, acct) = setup();
    for (amount, term) in [
        (499.99, LockTerm::Months3),
        (10_000.01, LockTerm::Months6),
        (4_999.0, LockTerm::Months12),
    ] {
        let err = ledger
            .submit_deposit(deposit(&acct, amount, PlanTier::Diamond, term))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }), "got {err:?}");
    }
    assert!(ledger.list_transactions(&acct).unwrap().is_empty());
}

#[test]
fn non_positive_amounts_are_rejected() {
    let (_clock, ledger, acct) = setup();
    for amount in [0.0, -100.0, f64::NAN] {
        let err = ledger
            .submit_deposit(deposit(&acct, amount, PlanTier::Gold, LockTerm::Months6))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));
    }
}

#[test]
fn new_investment_needs_plan_and_term() {
    let (_clock, ledger, acct) = setup();
    let mut req = deposit(&acct, 2_000.0, PlanTier::Gold, LockTerm::Months6);
    req.term = None;
    assert!(matches!(ledger.submit_deposit(req), Err(LedgerError::Validation { .. })));
}

#[test]
fn unknown_account_is_not_found() {
    let (_clock, ledger, _acct) = setup();
    let err = ledger
        .submit_deposit(deposit("nobody", 2_000.0, PlanTier::Gold, LockTerm::Months6))
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "account", .. }));
}

#[test]
fn top_up_inherits_plan_and_skips_band() {
    let (_clock, ledger, acct) = setup();
    let inv = open_investment(&ledger, &acct, 2_000.0);

    // 200 is below the 6-month band minimum; top-ups are not re-validated.
    let txn = ledger.submit_deposit(top_up(&acct, &inv, 200.0)).unwrap();
    assert!(txn.is_top_up());
    assert_eq!(txn.plan, Some(PlanTier::Gold));
    assert_eq!(txn.term, Some(LockTerm::Months6));
}

#[test]
fn top_up_of_another_accounts_investment_is_not_found() {
    let (_clock, ledger, acct) = setup();
    let inv = open_investment(&ledger, &acct, 2_000.0);
    let other = ledger.register_account("Grace Hopper").unwrap();

    let err = ledger.submit_deposit(top_up(&other.account_id, &inv, 500.0)).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "investment", .. }));
}

#[test]
fn top_up_past_ceiling_is_advisory_by_default() {
    let (_clock, ledger, acct) = setup();
    let inv = open_investment(&ledger, &acct, 10_000.0);
    let txn = ledger.submit_deposit(top_up(&acct, &inv, 45_000.0)).unwrap();
    let outcome = ledger.approve_transaction(&txn.transaction_id).unwrap();
    assert_eq!(outcome.investment.principal_plus_accrued, 55_000.0);
}

#[test]
fn withdrawal_before_maturity_is_rejected_without_a_record() {
    let (clock, ledger, acct) = setup();
    let inv = open_investment(&ledger, &acct, 5_000.0);
    let before = ledger.list_transactions(&acct).unwrap().len();

    clock.advance(Duration::days(90));
    let err = ledger
        .submit_withdrawal(WithdrawalRequest {
            account_id: acct.clone(),
            investment_id: inv.clone(),
            destination_address: "0xabc".into(),
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::LockViolation { .. }), "got {err:?}");
    assert_eq!(ledger.list_transactions(&acct).unwrap().len(), before);
}

#[test]
fn withdrawal_at_maturity_takes_the_whole_position() {
    let (clock, ledger, acct) = setup();
    let inv = open_investment(&ledger, &acct, 5_000.0);
    let lock = ledger.investment(&inv).unwrap().lock_expires_at;

    clock.set(lock);
    let txn = ledger
        .submit_transaction(TransactionRequest::Withdrawal(WithdrawalRequest {
            account_id: acct.clone(),
            investment_id: inv.clone(),
            destination_address: "  0xabc  ".into(),
        }))
        .unwrap();
    assert_eq!(txn.amount, 5_000.0);
    assert_eq!(txn.destination_address.as_deref(), Some("0xabc"));
    assert_eq!(txn.status, TransactionStatus::Pending);
    assert_eq!((txn.plan, txn.term), (None, None));
    let stored = ledger.transaction(&txn.transaction_id).unwrap();
    assert_eq!((stored.plan, stored.term), (None, None));
}

#[test]
fn withdrawal_needs_a_destination() {
    let (clock, ledger, acct) = setup();
    let inv = open_investment(&ledger, &acct, 5_000.0);
    clock.advance_months(6);
    let err = ledger
        .submit_withdrawal(WithdrawalRequest {
            account_id: acct,
            investment_id: inv,
            destination_address: "   ".into(),
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
}

#[test]
fn withdrawal_from_unknown_investment_is_not_found() {
    let (_clock, ledger, acct) = setup();
    let err = ledger
        .submit_withdrawal(WithdrawalRequest {
            account_id: acct,
            investment_id: "no-such-investment".into(),
            destination_address: "0xabc".into(),
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "investment", .. }));
}

#[test]
fn transactions_are_listed_newest_first() {
    let (clock, ledger, acct) = setup();
    let first = ledger
        .submit_deposit(deposit(&acct, 1_000.0, PlanTier::Silver, LockTerm::Months6))
        .unwrap();
    clock.advance(Duration::minutes(5));
    let second = ledger
        .submit_deposit(deposit(&acct, 2_000.0, PlanTier::Gold, LockTerm::Months6))
        .unwrap();

    let listed: Vec<_> = ledger
        .list_transactions(&acct)
        .unwrap()
        .into_iter()
        .map(|t| t.transaction_id)
        .collect();
    assert_eq!(listed, vec![second.transaction_id.clone(), first.transaction_id.clone()]);

    // The admin queue runs the other way.
    let queue: Vec<_> = ledger
        .list_pending_transactions()
        .unwrap()
        .into_iter()
        .map(|t| t.transaction_id)
        .collect();
    assert_eq!(queue, vec![first.transaction_id, second.transaction_id]);
}

#[test]
fn submission_is_recorded_in_the_audit_trail() {
    let (_clock, ledger, acct) = setup();
    let txn = ledger
        .submit_deposit(deposit(&acct, 3_000.0, PlanTier::Gold, LockTerm::Months6))
        .unwrap();
    let events = ledger.events_for(&txn.transaction_id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "transaction_submitted");
}

#[test]
fn request_json_uses_plan_names_and_term_months() {
    let json = r#"{"kind":"deposit","account_id":"a1","amount":5000,"plan":"GOLD TIER","term":6}"#;
    let TransactionRequest::Deposit(req) = serde_json::from_str(json).unwrap() else {
        panic!("expected a deposit");
    };
    assert_eq!(req.plan, Some(PlanTier::Gold));
    assert_eq!(req.term, Some(LockTerm::Months6));

    let bad = r#"{"kind":"deposit","account_id":"a1","amount":5000,"plan":"GOLD TIER","term":7}"#;
    assert!(serde_json::from_str::<TransactionRequest>(bad).is_err());
}
