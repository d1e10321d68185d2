use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::models::*;
use crate::reconcile::{role, ApprovalPhase, Role, StatusBadge};
use crate::reconcile::views::approvals_label;

/// Characters kept on each side when an address is shortened
const SHORT_HEAD: usize = 8;
const SHORT_TAIL: usize = 8;

// ========== REQUEST MODELS ==========

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct ClipboardRequest {
    pub text: String,
}

// ========== RESPONSE MODELS ==========

/// One line of the history listing
#[derive(Debug, Serialize)]
pub struct HistoryRow {
    pub id: TransactionId,
    pub to: String,
    pub amount_units: Amount,
    pub amount: String,
    pub approvals: String,
    pub status: StatusBadge,
}

impl HistoryRow {
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            to: tx
                .to
                .as_ref()
                .map(|to| to.shortened(SHORT_HEAD, SHORT_TAIL))
                .unwrap_or_default(),
            amount_units: tx.amount,
            amount: tx.amount.to_coin_string(),
            approvals: approvals_label(tx),
            status: StatusBadge::of(tx),
        }
    }
}

/// Per-party approval badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartyBadge {
    Approved,
    Approving,
    Pending,
}

impl PartyBadge {
    /// The ledger flag wins; otherwise the acting party's overlay shows through
    fn of(flag: bool, party: Role, actor: Option<Role>, phase: Option<ApprovalPhase>) -> Self {
        if flag {
            return PartyBadge::Approved;
        }
        match (actor, phase) {
            (Some(actor), Some(ApprovalPhase::Approved)) if actor == party => PartyBadge::Approved,
            (Some(actor), Some(_)) if actor == party => PartyBadge::Approving,
            _ => PartyBadge::Pending,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PendingRow {
    pub id: TransactionId,
    pub sender: Principal,
    pub to: Option<Principal>,
    pub amount_units: Amount,
    pub amount: String,
    pub approvals: String,
    pub role: Option<Role>,
    pub sender_badge: PartyBadge,
    pub receiver_badge: PartyBadge,
    pub approval_phase: Option<ApprovalPhase>,
    pub can_approve: bool,
}

impl PendingRow {
    pub fn from_transaction(
        tx: &Transaction,
        identity: Option<&Principal>,
        phase: Option<ApprovalPhase>,
    ) -> Self {
        let role = role::resolve(identity, tx);
        Self {
            id: tx.id,
            sender: tx.sender.clone(),
            to: tx.to.clone(),
            amount_units: tx.amount,
            amount: tx.amount.to_coin_string(),
            approvals: approvals_label(tx),
            role,
            sender_badge: PartyBadge::of(tx.sender_approved, Role::Sender, role, phase),
            receiver_badge: PartyBadge::of(tx.receiver_approved, Role::Receiver, role, phase),
            approval_phase: phase,
            can_approve: identity.is_some() && phase != Some(ApprovalPhase::Pending),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadyRow {
    pub id: TransactionId,
    pub sender: Principal,
    pub to: Option<Principal>,
    pub amount_units: Amount,
    pub amount: String,
    pub approvals: String,
    pub executing: bool,
    pub can_execute: bool,
}

impl ReadyRow {
    pub fn from_transaction(tx: &Transaction, executing: bool) -> Self {
        Self {
            id: tx.id,
            sender: tx.sender.clone(),
            to: tx.to.clone(),
            amount_units: tx.amount,
            amount: tx.amount.to_coin_string(),
            approvals: approvals_label(tx),
            executing,
            can_execute: !executing,
        }
    }
}

/// Result of a write that was accepted for submission
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub id: TransactionId,
    pub txid: String,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub signed_in: bool,
    pub identity: Option<Principal>,
    pub network: Network,
}

#[derive(Debug, Serialize)]
pub struct ClipboardResponse {
    pub copied: bool,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub last_fetch: DateTime<Utc>,
    pub transactions: usize,
    pub pending: usize,
    pub ready: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::gateway::mock::{tx, RECEIVER, SENDER};

    #[test]
    fn test_history_row() {
        let row = HistoryRow::from_transaction(&tx(2, 1));
        assert_eq!(row.to, "ST2CY5V3...4CFRK9AG");
        assert_eq!(row.amount, "0.00000500");
        assert_eq!(row.approvals, "1/2");
        assert_eq!(row.status, StatusBadge::Pending);
    }

    #[test]
    fn test_pending_row_for_sender() {
        let mut tx = tx(4, 1);
        // Ledger populated the count but not the flags yet
        tx.sender_approved = false;

        let sender = Principal::new(SENDER);
        let row = PendingRow::from_transaction(&tx, Some(&sender), None);
        assert_eq!(row.role, Some(Role::Sender));
        assert_eq!(row.sender_badge, PartyBadge::Pending);
        assert_eq!(row.receiver_badge, PartyBadge::Pending);
        assert!(row.can_approve);

        let row = PendingRow::from_transaction(&tx, Some(&sender), Some(ApprovalPhase::Pending));
        assert_eq!(row.sender_badge, PartyBadge::Approving);
        assert!(!row.can_approve);
    }

    #[test]
    fn test_pending_row_signed_out() {
        let row = PendingRow::from_transaction(&tx(4, 1), None, None);
        assert_eq!(row.role, None);
        assert_eq!(row.sender_badge, PartyBadge::Approved);
        assert!(!row.can_approve);

        let receiver = Principal::new(RECEIVER);
        let row = PendingRow::from_transaction(&tx(4, 1), Some(&receiver), Some(ApprovalPhase::Approving));
        assert_eq!(row.receiver_badge, PartyBadge::Approving);
        assert!(row.can_approve);
    }

    #[test]
    fn test_confirmed_overlay_shows_approved_before_flag_lands() {
        let mut tx = tx(4, 1);
        tx.receiver_approved = false;

        let receiver = Principal::new(RECEIVER);
        let row = PendingRow::from_transaction(&tx, Some(&receiver), Some(ApprovalPhase::Approved));
        assert_eq!(row.receiver_badge, PartyBadge::Approved);
        // The other party is untouched by this user's overlay
        assert_eq!(row.sender_badge, PartyBadge::Approved);

        tx.sender_approved = false;
        let row = PendingRow::from_transaction(&tx, Some(&receiver), Some(ApprovalPhase::Approved));
        assert_eq!(row.sender_badge, PartyBadge::Pending);
    }
}
