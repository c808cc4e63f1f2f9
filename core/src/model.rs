//! Ledger records: accounts, investments and transactions.
//!
//! RULE: status and catalogue values are closed enums. Anything read back
//! from storage is parsed into these types or rejected as corrupt.

use crate::types::{AccountId, InvestmentId, Money, Timestamp, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self { kind, value: value.into() }
    }
}

// ── Catalogue ──────────────────────────────────────────────────────

/// Investment plan. Fixes the annual yield at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanTier {
    #[serde(rename = "SILVER TIER")]
    Silver,
    #[serde(rename = "GOLD TIER")]
    Gold,
    #[serde(rename = "DIAMOND TIER")]
    Diamond,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Silver, PlanTier::Gold, PlanTier::Diamond];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Silver  => "SILVER TIER",
            PlanTier::Gold    => "GOLD TIER",
            PlanTier::Diamond => "DIAMOND TIER",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlanTier::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseEnumError::new("plan", s))
    }
}

/// Lock term in months. Fixes the deposit band and ceiling at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum LockTerm {
    Months3,
    Months6,
    Months12,
}

impl LockTerm {
    pub const ALL: [LockTerm; 3] = [LockTerm::Months3, LockTerm::Months6, LockTerm::Months12];

    pub fn months(&self) -> u32 {
        match self {
            LockTerm::Months3  => 3,
            LockTerm::Months6  => 6,
            LockTerm::Months12 => 12,
        }
    }
}

impl TryFrom<u32> for LockTerm {
    type Error = ParseEnumError;

    fn try_from(months: u32) -> Result<Self, Self::Error> {
        match months {
            3  => Ok(LockTerm::Months3),
            6  => Ok(LockTerm::Months6),
            12 => Ok(LockTerm::Months12),
            other => Err(ParseEnumError::new("lock term", other.to_string())),
        }
    }
}

impl From<LockTerm> for u32 {
    fn from(term: LockTerm) -> u32 {
        term.months()
    }
}

impl fmt::Display for LockTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} months", self.months())
    }
}

// ── Status enums ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentStatus {
    Active,
    Closed,
}

impl InvestmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentStatus::Active => "active",
            InvestmentStatus::Closed => "closed",
        }
    }
}

impl FromStr for InvestmentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(InvestmentStatus::Active),
            "closed" => Ok(InvestmentStatus::Closed),
            other => Err(ParseEnumError::new("investment status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit    => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit"    => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            other => Err(ParseEnumError::new("transaction kind", other)),
        }
    }
}

/// `Pending` is the only non-terminal state. Terminal states are write-once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Denied,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending  => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Denied   => "denied",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"  => Ok(TransactionStatus::Pending),
            "approved" => Ok(TransactionStatus::Approved),
            "denied"   => Ok(TransactionStatus::Denied),
            other => Err(ParseEnumError::new("transaction status", other)),
        }
    }
}

// ── Records ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub display_name: String,
    /// Only ever incremented, by the accrual engine.
    pub total_realized_profit: Money,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub investment_id: InvestmentId,
    pub account_id: AccountId,
    pub principal_plus_accrued: Money,
    pub plan: PlanTier,
    pub term: LockTerm,
    /// Percent per year, fixed from `plan` at creation.
    pub annual_yield_rate: f64,
    /// Fixed from `term` at creation.
    pub ceiling_amount: Money,
    pub created_at: Timestamp,
    pub lock_expires_at: Timestamp,
    pub last_accrual_at: Timestamp,
    pub status: InvestmentStatus,
    /// Bumped on every write; guards read-then-write updates.
    pub version: u64,
}

const SECONDS_PER_DAY: f64 = 86_400.0;

impl Investment {
    pub fn is_active(&self) -> bool {
        self.status == InvestmentStatus::Active
    }

    pub fn is_mature(&self, now: Timestamp) -> bool {
        now >= self.lock_expires_at
    }

    /// One day of yield on the current position.
    pub fn daily_profit(&self) -> Money {
        self.principal_plus_accrued * (self.annual_yield_rate / 100.0) / crate::types::DAYS_PER_YEAR
    }

    /// Yield for one accrual period, pro-rated from the daily rate.
    /// A 24h period is exactly `daily_profit`.
    pub fn period_profit(&self, period: chrono::Duration) -> Money {
        let days = period.num_seconds() as f64 / SECONDS_PER_DAY;
        self.daily_profit() * days
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    /// None: the deposit opens a new investment. Immutable after creation.
    pub investment_id: Option<InvestmentId>,
    pub amount: Money,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub plan: Option<PlanTier>,
    pub term: Option<LockTerm>,
    /// Withdrawal payout address.
    pub destination_address: Option<String>,
    /// Platform wallet the client was told to fund a deposit to.
    pub funding_wallet: Option<String>,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

impl Transaction {
    pub fn is_top_up(&self) -> bool {
        self.kind == TransactionKind::Deposit && self.investment_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_names_parse_case_insensitively() {
        assert_eq!("gold tier".parse::<PlanTier>().unwrap(), PlanTier::Gold);
        assert_eq!(" DIAMOND TIER ".parse::<PlanTier>().unwrap(), PlanTier::Diamond);
        assert!("PLATINUM TIER".parse::<PlanTier>().is_err());
    }

    #[test]
    fn lock_term_rejects_months_outside_catalogue() {
        assert_eq!(LockTerm::try_from(6).unwrap(), LockTerm::Months6);
        assert!(LockTerm::try_from(9).is_err());
        assert!(serde_json::from_str::<LockTerm>("4").is_err());
        assert_eq!(serde_json::to_string(&LockTerm::Months12).unwrap(), "12");
    }

    #[test]
    fn plan_serializes_with_display_name() {
        assert_eq!(serde_json::to_string(&PlanTier::Silver).unwrap(), "\"SILVER TIER\"");
    }
}
