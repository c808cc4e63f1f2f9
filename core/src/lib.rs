//! Aureus ledger core: custodial fixed-term investments.
//!
//! Deposits and withdrawals enter as `pending` requests, an administrator
//! approves or denies them, and a periodic accrual cycle compounds yield
//! into every active investment.

pub mod accrual_engine;
pub mod approval_gateway;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod ledger;
pub mod model;
pub mod notify;
pub mod request_processor;
pub mod schedule;
pub mod store;
pub mod types;

pub use error::{LedgerError, LedgerResult};
pub use ledger::Ledger;
