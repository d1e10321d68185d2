use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::error::ValidationError;
use crate::ledger::models::TransactionId;
use crate::reconcile::fetcher::Snapshot;
use crate::reconcile::role::Role;
use crate::reconcile::timers::TimerTable;

/// Why a re-fetch was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    ApprovalSettled(TransactionId),
    ExecutionSettled(TransactionId),
}

/// Local display state of an approval that the ledger hasn't confirmed yet.
/// No entry means the snapshot is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApprovalPhase {
    /// Write call in flight; the approve control is disabled
    Pending,
    /// Write accepted for submission, waiting for the ledger
    Approving,
    /// A fetched snapshot already shows the approval. Advisory only.
    Approved,
}

#[derive(Debug, Clone, Copy)]
struct Overlay {
    phase: ApprovalPhase,
    /// Approval count seen when the user acted
    baseline: u32,
    actor: Option<Role>,
}

type OverlayTable = Arc<RwLock<Arc<HashMap<TransactionId, Overlay>>>>;

/// Copy-on-write update of the overlay table
fn update(table: &OverlayTable, f: impl FnOnce(&mut HashMap<TransactionId, Overlay>)) {
    let mut guard = table.write();
    let mut next = HashMap::clone(&guard);
    f(&mut next);
    *guard = Arc::new(next);
}

pub struct ApprovalTracker {
    overlays: OverlayTable,
    timers: Arc<TimerTable>,
    settle: Duration,
    refresh_tx: UnboundedSender<RefreshReason>,
}

impl ApprovalTracker {
    pub fn new(settle: Duration, refresh_tx: UnboundedSender<RefreshReason>) -> Self {
        Self {
            overlays: Arc::new(RwLock::new(Arc::new(HashMap::new()))),
            timers: TimerTable::new("approval"),
            settle,
            refresh_tx,
        }
    }

    /// absent/approving/approved → pending. Refused while a write is already in flight.
    pub fn begin(
        &self,
        id: TransactionId,
        baseline: u32,
        actor: Option<Role>,
    ) -> Result<(), ValidationError> {
        let mut guard = self.overlays.write();
        if matches!(guard.get(&id), Some(o) if o.phase == ApprovalPhase::Pending) {
            return Err(ValidationError::ActionInFlight(id));
        }
        let mut next = HashMap::clone(&guard);
        next.insert(
            id,
            Overlay {
                phase: ApprovalPhase::Pending,
                baseline,
                actor,
            },
        );
        *guard = Arc::new(next);
        Ok(())
    }

    /// pending → approving, and (re)arm the settle timer.
    /// On expiry the overlay is dropped and exactly one refresh is requested.
    pub fn confirm(&self, id: TransactionId) -> bool {
        update(&self.overlays, |table| {
            if let Some(overlay) = table.get_mut(&id) {
                overlay.phase = ApprovalPhase::Approving;
            }
        });

        let overlays = self.overlays.clone();
        let refresh_tx = self.refresh_tx.clone();
        let scheduled = self.timers.schedule(id, self.settle, move || {
            // A re-issued approval still in flight keeps its overlay
            update(&overlays, |table| {
                if matches!(table.get(&id), Some(o) if o.phase != ApprovalPhase::Pending) {
                    table.remove(&id);
                }
            });
            if refresh_tx.send(RefreshReason::ApprovalSettled(id)).is_err() {
                debug!("Refresh loop gone, dropping settle of transaction {}", id);
            }
        });

        if scheduled {
            info!("⏳ Approval of transaction {} settling in {:?}", id, self.settle);
        }
        scheduled
    }

    /// pending → absent after a failed write. Any earlier settle timer stays armed.
    pub fn abort(&self, id: TransactionId) {
        update(&self.overlays, |table| {
            if matches!(table.get(&id), Some(o) if o.phase == ApprovalPhase::Pending) {
                table.remove(&id);
            }
        });
    }

    /// approving → approved for every overlay the snapshot already confirms
    pub fn observe(&self, snapshot: &Snapshot) {
        update(&self.overlays, |table| {
            for (id, overlay) in table.iter_mut() {
                if overlay.phase != ApprovalPhase::Approving {
                    continue;
                }
                let Some(tx) = snapshot.get(*id) else {
                    continue;
                };
                let flagged = match overlay.actor {
                    Some(Role::Sender) => tx.sender_approved,
                    Some(Role::Receiver) => tx.receiver_approved,
                    None => false,
                };
                if flagged || tx.approval_count > overlay.baseline {
                    debug!("Ledger confirms approval of transaction {}", id);
                    overlay.phase = ApprovalPhase::Approved;
                }
            }
        });
    }

    pub fn phase(&self, id: TransactionId) -> Option<ApprovalPhase> {
        self.overlays.read().get(&id).map(|o| o.phase)
    }

    pub fn phases(&self) -> HashMap<TransactionId, ApprovalPhase> {
        let table = self.overlays.read().clone();
        table.iter().map(|(id, o)| (*id, o.phase)).collect()
    }

    #[cfg(test)]
    pub fn has_timer(&self, id: TransactionId) -> bool {
        self.timers.is_scheduled(id)
    }

    /// Full reset: no overlay and no timer survives
    pub fn clear(&self) {
        self.timers.cancel_all();
        *self.overlays.write() = Arc::new(HashMap::new());
    }

    pub fn teardown(&self) {
        self.timers.close();
        *self.overlays.write() = Arc::new(HashMap::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::gateway::mock::tx;
    use tokio::sync::mpsc;

    fn id(n: u64) -> TransactionId {
        TransactionId::new(n).unwrap()
    }

    fn tracker() -> (ApprovalTracker, mpsc::UnboundedReceiver<RefreshReason>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ApprovalTracker::new(Duration::from_secs(10), tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RefreshReason>) -> Vec<RefreshReason> {
        let mut out = Vec::new();
        while let Ok(reason) = rx.try_recv() {
            out.push(reason);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_expires_and_refreshes_once() {
        let (tracker, mut rx) = tracker();

        tracker.begin(id(4), 1, Some(Role::Sender)).unwrap();
        assert_eq!(tracker.phase(id(4)), Some(ApprovalPhase::Pending));
        assert!(tracker.confirm(id(4)));
        assert_eq!(tracker.phase(id(4)), Some(ApprovalPhase::Approving));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(drain(&mut rx).is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(tracker.phase(id(4)), None);
        assert_eq!(drain(&mut rx), vec![RefreshReason::ApprovalSettled(id(4))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reissued_approvals_refresh_exactly_once() {
        let (tracker, mut rx) = tracker();

        for _ in 0..3 {
            tracker.begin(id(2), 0, None).unwrap();
            tracker.confirm(id(2));
            tokio::time::sleep(Duration::from_secs(3)).await;
        }

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(drain(&mut rx), vec![RefreshReason::ApprovalSettled(id(2))]);
        assert_eq!(tracker.phase(id(2)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_submission_rolls_back() {
        let (tracker, mut rx) = tracker();

        tracker.begin(id(3), 0, None).unwrap();
        assert!(matches!(
            tracker.begin(id(3), 0, None),
            Err(ValidationError::ActionInFlight(_))
        ));
        tracker.abort(id(3));
        assert_eq!(tracker.phase(id(3)), None);
        assert!(!tracker.has_timer(id(3)));

        // Control is usable again
        tracker.begin(id(3), 0, None).unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_marks_confirmed_approvals() {
        let (tracker, _rx) = tracker();

        tracker.begin(id(4), 1, Some(Role::Receiver)).unwrap();
        tracker.confirm(id(4));
        tracker.begin(id(5), 0, Some(Role::Sender)).unwrap();
        tracker.confirm(id(5));

        // id 4 now at quorum, id 5 unchanged on the ledger
        let snapshot = Snapshot::from_transactions([tx(4, 2), tx(5, 0)]);
        tracker.observe(&snapshot);

        assert_eq!(tracker.phase(id(4)), Some(ApprovalPhase::Approved));
        assert_eq!(tracker.phase(id(5)), Some(ApprovalPhase::Approving));
        assert!(tracker.has_timer(id(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_silences_timers() {
        let (tracker, mut rx) = tracker();

        tracker.begin(id(1), 0, None).unwrap();
        tracker.confirm(id(1));
        tracker.teardown();
        assert!(tracker.phases().is_empty());

        tracker.begin(id(2), 0, None).unwrap();
        assert!(!tracker.confirm(id(2)));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(drain(&mut rx).is_empty());
    }
}
