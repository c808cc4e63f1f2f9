//! The audit log — every ledger state change, in commit order.
//!
//! RULE: events are appended inside the same atomic unit as the change
//! they describe. A rolled-back change leaves no event behind.

use crate::{
    model::{LockTerm, PlanTier, TransactionKind},
    types::{AccountId, EntityId, InvestmentId, Money, Timestamp, TransactionId},
};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended — never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    // ── Request flow ──────────────────────────────
    TransactionSubmitted {
        transaction_id: TransactionId,
        account_id: AccountId,
        investment_id: Option<InvestmentId>,
        kind: TransactionKind,
        amount: Money,
    },
    TransactionApproved {
        transaction_id: TransactionId,
        investment_id: InvestmentId,
    },
    TransactionDenied {
        transaction_id: TransactionId,
    },

    // ── Investment lifecycle ──────────────────────
    InvestmentOpened {
        investment_id: InvestmentId,
        account_id: AccountId,
        amount: Money,
        plan: PlanTier,
        term: LockTerm,
        lock_expires_at: Timestamp,
    },
    InvestmentToppedUp {
        investment_id: InvestmentId,
        amount: Money,
    },
    InvestmentWithdrawn {
        investment_id: InvestmentId,
        amount: Money,
        remaining: Money,
    },
    InvestmentClosed {
        investment_id: InvestmentId,
    },

    // ── Accrual ───────────────────────────────────
    ProfitAccrued {
        investment_id: InvestmentId,
        account_id: AccountId,
        profit: Money,
        position: Money,
    },
    AccrualCycleCompleted {
        applied: usize,
        skipped: usize,
        failed: usize,
        total_profit: Money,
    },
}

impl LedgerEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            LedgerEvent::TransactionSubmitted { .. }  => "transaction_submitted",
            LedgerEvent::TransactionApproved { .. }   => "transaction_approved",
            LedgerEvent::TransactionDenied { .. }     => "transaction_denied",
            LedgerEvent::InvestmentOpened { .. }      => "investment_opened",
            LedgerEvent::InvestmentToppedUp { .. }    => "investment_topped_up",
            LedgerEvent::InvestmentWithdrawn { .. }   => "investment_withdrawn",
            LedgerEvent::InvestmentClosed { .. }      => "investment_closed",
            LedgerEvent::ProfitAccrued { .. }         => "profit_accrued",
            LedgerEvent::AccrualCycleCompleted { .. } => "accrual_cycle_completed",
        }
    }

    /// The entity this event is filed under.
    pub fn entity_id(&self) -> EntityId {
        match self {
            LedgerEvent::TransactionSubmitted { transaction_id, .. }
            | LedgerEvent::TransactionApproved { transaction_id, .. }
            | LedgerEvent::TransactionDenied { transaction_id } => transaction_id.clone(),
            LedgerEvent::InvestmentOpened { investment_id, .. }
            | LedgerEvent::InvestmentToppedUp { investment_id, .. }
            | LedgerEvent::InvestmentWithdrawn { investment_id, .. }
            | LedgerEvent::InvestmentClosed { investment_id }
            | LedgerEvent::ProfitAccrued { investment_id, .. } => investment_id.clone(),
            LedgerEvent::AccrualCycleCompleted { .. } => "accrual".to_string(),
        }
    }
}

/// A persisted event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub entity_id: EntityId,
    pub event_type: String,
    pub payload: String,
    pub recorded_at: Timestamp,
}

impl EventLogEntry {
    pub fn new(event: &LedgerEvent, recorded_at: Timestamp) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            entity_id: event.entity_id(),
            event_type: event.type_name().to_string(),
            payload: serde_json::to_string(event)?,
            recorded_at,
        })
    }

    pub fn decode(&self) -> serde_json::Result<LedgerEvent> {
        serde_json::from_str(&self.payload)
    }
}
