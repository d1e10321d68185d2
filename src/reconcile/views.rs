use serde::Serialize;

use crate::ledger::models::{Transaction, TransactionId, QUORUM};
use crate::reconcile::fetcher::Snapshot;

/// Workflow stage a transaction is listed under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Below quorum and addressed to someone
    PendingApproval,
    /// At or above quorum
    ReadyToExecute,
    /// Everything addressed to someone
    History,
}

impl View {
    pub fn admits(&self, tx: &Transaction) -> bool {
        match self {
            View::PendingApproval => !tx.is_execution_eligible() && tx.has_recipient(),
            View::ReadyToExecute => tx.is_execution_eligible(),
            View::History => tx.has_recipient(),
        }
    }

    pub fn select<'a>(&self, snapshot: &'a Snapshot) -> Vec<&'a Transaction> {
        snapshot.iter().filter(|tx| self.admits(tx)).collect()
    }
}

/// Ids per view for one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewPartition {
    pub pending: Vec<TransactionId>,
    pub ready: Vec<TransactionId>,
    pub history: Vec<TransactionId>,
}

impl ViewPartition {
    pub fn of(snapshot: &Snapshot) -> Self {
        let ids = |view: View| -> Vec<TransactionId> {
            view.select(snapshot).iter().map(|tx| tx.id).collect()
        };
        Self {
            pending: ids(View::PendingApproval),
            ready: ids(View::ReadyToExecute),
            history: ids(View::History),
        }
    }
}

/// History listing badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusBadge {
    New,
    Pending,
    Ready,
}

impl StatusBadge {
    pub fn of(tx: &Transaction) -> Self {
        match tx.approval_count {
            n if n >= QUORUM => StatusBadge::Ready,
            0 => StatusBadge::New,
            _ => StatusBadge::Pending,
        }
    }
}

/// `n/2` progress label
pub fn approvals_label(tx: &Transaction) -> String {
    format!("{}/{}", tx.approval_count, QUORUM)
}
