use serde::Serialize;

use crate::ledger::models::{Principal, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Sender,
    Receiver,
}

/// Exact string match against the stored principals, sender first.
/// `None` when signed out or unrelated to the transaction.
pub fn resolve(identity: Option<&Principal>, tx: &Transaction) -> Option<Role> {
    let identity = identity?;
    if &tx.sender == identity {
        Some(Role::Sender)
    } else if tx.to.as_ref() == Some(identity) {
        Some(Role::Receiver)
    } else {
        None
    }
}
