use crate::types::{EntityId, Money, Timestamp};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: EntityId },

    #[error("Investment '{investment_id}' is locked until {lock_expires_at}")]
    LockViolation {
        investment_id: EntityId,
        lock_expires_at: Timestamp,
    },

    #[error("Transaction '{transaction_id}' already processed ({status})")]
    Concurrency {
        transaction_id: EntityId,
        status: String,
    },

    #[error("Invariant violated on investment '{investment_id}': balance {balance:.2}, requested {requested:.2}")]
    InvariantViolation {
        investment_id: EntityId,
        balance: Money,
        requested: Money,
    },

    #[error("Investment '{investment_id}' kept changing; gave up after {attempts} attempts")]
    Contention {
        investment_id: EntityId,
        attempts: u32,
    },

    #[error("Database error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into() }
    }

    pub fn not_found(entity: &'static str, id: impl Into<EntityId>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    /// Storage failures leave the ledger untouched and may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Contention { .. })
    }

    /// Stable machine-readable code for callers that render rejections.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. }         => "validation",
            Self::NotFound { .. }           => "not_found",
            Self::LockViolation { .. }      => "lock_violation",
            Self::Concurrency { .. }        => "already_processed",
            Self::InvariantViolation { .. } => "invariant_violation",
            Self::Contention { .. }         => "contention",
            Self::Persistence(_)            => "persistence",
            Self::Serialization(_)          => "serialization",
            Self::Other(_)                  => "internal",
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
