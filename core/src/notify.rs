//! Outbound notifications — one-way and best-effort.
//!
//! RULE: a notice is sent only after the change it reports has committed,
//! and nothing a notifier does can fail or delay the ledger operation.

use crate::{
    model::{PlanTier, TransactionKind},
    types::{AccountId, Money, TransactionId},
};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    DepositRequested,
    TopUpRequested,
    WithdrawalRequested,
    TransactionApproved,
    TransactionDenied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub account_name: String,
    pub transaction_kind: TransactionKind,
    pub amount: Money,
    pub plan: Option<PlanTier>,
    /// Withdrawal payout address, when there is one.
    pub destination_address: Option<String>,
}

impl Notice {
    pub fn subject(&self) -> String {
        let action = match self.kind {
            NoticeKind::DepositRequested    => "NEW DEPOSIT REQUEST",
            NoticeKind::TopUpRequested      => "TOP-UP REQUEST",
            NoticeKind::WithdrawalRequested => "WITHDRAWAL REQUEST",
            NoticeKind::TransactionApproved => "TRANSACTION APPROVED",
            NoticeKind::TransactionDenied   => "TRANSACTION DENIED",
        };
        format!("{action}: ${:.2} - {}", self.amount, self.account_name)
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes each notice to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        log::info!("notice [{}] {}", notice.transaction_id, notice.subject());
    }
}

/// Where a `QueuedNotifier` worker actually delivers notices (mail relay, webhook, ...).
pub trait NoticeSink: Send {
    fn deliver(&mut self, notice: &Notice) -> anyhow::Result<()>;
}

/// Hands notices to a background worker. `notify` never blocks on delivery.
pub struct QueuedNotifier {
    tx: parking_lot::Mutex<Sender<Notice>>,
}

impl QueuedNotifier {
    /// Start the delivery worker. The worker exits once the notifier has
    /// been dropped and the queue has drained.
    pub fn spawn<S>(mut sink: S) -> std::io::Result<(Self, JoinHandle<()>)>
    where
        S: NoticeSink + 'static,
    {
        let (tx, rx) = mpsc::channel::<Notice>();
        let worker = thread::Builder::new()
            .name("notice-delivery".into())
            .spawn(move || {
                for notice in rx {
                    if let Err(e) = sink.deliver(&notice) {
                        log::warn!(
                            "notice delivery failed for {}: {e:#}",
                            notice.transaction_id
                        );
                    }
                }
                log::debug!("notice worker stopped");
            })?;
        Ok((
            Self {
                tx: parking_lot::Mutex::new(tx),
            },
            worker,
        ))
    }
}

impl Notifier for QueuedNotifier {
    fn notify(&self, notice: Notice) {
        if let Err(e) = self.tx.lock().send(notice) {
            log::warn!("notice dropped, worker gone: {}", e.0.transaction_id);
        }
    }
}
