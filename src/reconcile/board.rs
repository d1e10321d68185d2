use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::error::{AppError, AppResult, ValidationError};
use crate::ledger::models::{Amount, Principal, ScanRange, TransactionId};
use crate::ledger::{LedgerGateway, TxId};
use crate::reconcile::fetcher::{Snapshot, SnapshotFetcher};
use crate::reconcile::role;
use crate::reconcile::timers::TimerTable;
use crate::reconcile::tracker::{ApprovalPhase, ApprovalTracker, RefreshReason};
use crate::reconcile::views::View;
use crate::wallet::{Clipboard, IdentityProvider};

pub const APPROVE_FAILED: &str = "Failed to approve transaction. Please try again.";
pub const EXECUTE_FAILED: &str = "Failed to execute transaction. Please try again.";
pub const PROPOSE_FAILED: &str = "Failed to propose transaction. Please try again.";
pub const PROPOSED: &str = "Transaction proposed successfully!";
pub const BATCH_FAILED: &str = "Failed to fetch transactions. Please try again.";

/// How long the "copied" indicator stays up
const COPIED_FOR: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct BoardSettings {
    pub range: ScanRange,
    pub approval_settle: Duration,
    pub execute_settle: Duration,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            range: ScanRange::default(),
            approval_settle: Duration::from_secs(10),
            execute_settle: Duration::from_secs(2),
        }
    }
}

/// Raw proposal form input
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProposalDraft {
    pub id: String,
    #[validate(
        length(min = 1, max = 34, message = "must be 1 to 34 characters"),
        custom = "ascii_only"
    )]
    pub to: String,
    pub amount: String,
}

fn ascii_only(value: &str) -> Result<(), validator::ValidationError> {
    if value.is_ascii() {
        Ok(())
    } else {
        Err(validator::ValidationError::new("ascii"))
    }
}

/// User-facing messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Notices {
    pub success: Option<String>,
    pub action_error: Option<String>,
    /// Set only when a whole batch came back empty because of read failures
    pub batch_error: Option<String>,
    pub copied: Option<String>,
    pub loading: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub applied: bool,
    pub resolved: usize,
    pub failed: usize,
}

impl RefreshReport {
    /// Nothing resolved and at least one read failed
    pub fn is_unavailable(&self) -> bool {
        self.resolved == 0 && self.failed > 0
    }
}

struct BoardState {
    snapshot: Arc<Snapshot>,
    applied_seq: u64,
    success: Option<String>,
    action_error: Option<String>,
    batch_error: Option<String>,
    copied: Option<(String, Instant)>,
}

type IdSet = Arc<RwLock<Arc<HashSet<TransactionId>>>>;

fn set_membership(set: &IdSet, id: TransactionId, member: bool) -> bool {
    let mut guard = set.write();
    if guard.contains(&id) == member {
        return false;
    }
    let mut next = HashSet::clone(&guard);
    if member {
        next.insert(id);
    } else {
        next.remove(&id);
    }
    *guard = Arc::new(next);
    true
}

/// Owns the propose → approve → execute workflow state
pub struct TransactionBoard {
    gateway: Arc<dyn LedgerGateway>,
    fetcher: SnapshotFetcher,
    identity: Arc<dyn IdentityProvider>,
    clipboard: Arc<dyn Clipboard>,
    tracker: ApprovalTracker,
    execute_timers: Arc<TimerTable>,
    /// Ids whose execute control is disabled
    executing: IdSet,
    execute_settle: Duration,
    state: RwLock<BoardState>,
    fetch_seq: AtomicU64,
    active: AtomicBool,
    refresh_tx: UnboundedSender<RefreshReason>,
    refresh_loop: Mutex<Option<JoinHandle<()>>>,
}

impl TransactionBoard {
    /// Build the board and start its refresh loop. Must run inside a tokio runtime.
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        identity: Arc<dyn IdentityProvider>,
        clipboard: Arc<dyn Clipboard>,
        settings: BoardSettings,
    ) -> Arc<Self> {
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

        let board = Arc::new(Self {
            fetcher: SnapshotFetcher::new(gateway.clone(), settings.range),
            gateway,
            identity,
            clipboard,
            tracker: ApprovalTracker::new(settings.approval_settle, refresh_tx.clone()),
            execute_timers: TimerTable::new("execute"),
            executing: Arc::new(RwLock::new(Arc::new(HashSet::new()))),
            execute_settle: settings.execute_settle,
            state: RwLock::new(BoardState {
                snapshot: Arc::new(Snapshot::empty()),
                applied_seq: 0,
                success: None,
                action_error: None,
                batch_error: None,
                copied: None,
            }),
            fetch_seq: AtomicU64::new(0),
            active: AtomicBool::new(true),
            refresh_tx,
            refresh_loop: Mutex::new(None),
        });

        let handle = tokio::spawn(Self::run_refresh_loop(Arc::downgrade(&board), refresh_rx));
        *board.refresh_loop.lock() = Some(handle);

        info!(
            "📋 Transaction board ready, scanning ids {:?}",
            settings.range.ids().map(|id| id.get()).collect::<Vec<_>>()
        );
        board
    }

    async fn run_refresh_loop(board: Weak<Self>, mut rx: UnboundedReceiver<RefreshReason>) {
        while let Some(reason) = rx.recv().await {
            let Some(board) = board.upgrade() else {
                break;
            };
            if !board.is_active() {
                break;
            }
            debug!("🔄 Refresh requested: {:?}", reason);
            board.refresh().await;
        }
        debug!("Refresh loop stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn ensure_active(&self) -> AppResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(AppError::Internal("transaction board is shut down".to_string()))
        }
    }

    fn ensure_in_range(&self, id: TransactionId) -> Result<(), ValidationError> {
        if self.fetcher.range().contains(id) {
            Ok(())
        } else {
            Err(ValidationError::OutOfRange(id))
        }
    }

    /// Fetch the whole scan window and apply it unless a newer batch already
    /// landed or the board was shut down meanwhile
    pub async fn refresh(&self) -> RefreshReport {
        let seq = self.fetch_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let outcome = self.fetcher.fetch_all().await;

        let mut report = RefreshReport {
            applied: false,
            resolved: outcome.snapshot.len(),
            failed: outcome.failures.len(),
        };

        if !self.is_active() {
            debug!("Discarding batch {} fetched after shutdown", seq);
            return report;
        }

        let unavailable = outcome.is_unavailable();
        let snapshot = Arc::new(outcome.snapshot);
        {
            let mut state = self.state.write();
            if seq <= state.applied_seq {
                debug!("Dropping stale batch {} (batch {} already applied)", seq, state.applied_seq);
                return report;
            }
            state.applied_seq = seq;
            state.snapshot = snapshot.clone();
            state.batch_error = unavailable.then(|| BATCH_FAILED.to_string());
        }

        if unavailable {
            warn!("⚠️ Ledger unavailable: all {} read(s) failed", report.failed);
        }

        self.tracker.observe(&snapshot);
        report.applied = true;
        report
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.state.read().snapshot.clone()
    }

    pub fn identity(&self) -> Option<Principal> {
        self.identity.current_identity()
    }

    pub fn approval_phases(&self) -> HashMap<TransactionId, ApprovalPhase> {
        self.tracker.phases()
    }

    pub fn is_executing(&self, id: TransactionId) -> bool {
        self.executing.read().contains(&id)
    }

    pub fn notices(&self) -> Notices {
        let state = self.state.read();
        let copied = state
            .copied
            .as_ref()
            .filter(|(_, at)| at.elapsed() < COPIED_FOR)
            .map(|(text, _)| text.clone());

        Notices {
            success: state.success.clone(),
            action_error: state.action_error.clone(),
            batch_error: state.batch_error.clone(),
            copied,
            loading: self.fetch_seq.load(Ordering::Acquire) > state.applied_seq,
        }
    }

    fn report(&self, outcome: Result<String, &str>) {
        let mut state = self.state.write();
        match outcome {
            Ok(message) => {
                state.success = Some(message);
                state.action_error = None;
            }
            Err(message) => {
                state.success = None;
                state.action_error = Some(message.to_string());
            }
        }
    }

    pub async fn approve(&self, id: TransactionId) -> AppResult<TxId> {
        self.ensure_active()?;
        self.ensure_in_range(id)?;
        let identity = self
            .identity
            .current_identity()
            .ok_or(ValidationError::NotSignedIn)?;

        let snapshot = self.snapshot();
        let tx = snapshot
            .get(id)
            .filter(|tx| View::PendingApproval.admits(tx))
            .ok_or(ValidationError::NotPendingApproval(id))?;

        let actor = role::resolve(Some(&identity), tx);
        self.tracker.begin(id, tx.approval_count, actor)?;

        match self.gateway.approve(id).await {
            Ok(txid) => {
                self.tracker.confirm(id);
                self.report(Ok(format!("Transaction {} is being approved.", id)));
                Ok(txid)
            }
            Err(e) => {
                self.tracker.abort(id);
                error!("❌ Approval of transaction {} failed: {}", id, e);
                self.report(Err(APPROVE_FAILED));
                Err(e.into())
            }
        }
    }

    pub async fn execute(&self, id: TransactionId) -> AppResult<TxId> {
        self.ensure_active()?;
        self.ensure_in_range(id)?;

        let snapshot = self.snapshot();
        snapshot
            .get(id)
            .filter(|tx| View::ReadyToExecute.admits(tx))
            .ok_or(ValidationError::NotExecutable(id))?;

        if !set_membership(&self.executing, id, true) {
            return Err(ValidationError::ActionInFlight(id).into());
        }

        match self.gateway.execute(id).await {
            Ok(txid) => {
                self.report(Ok(format!("Transaction {} has been executed successfully", id)));

                // Control stays disabled until the post-execute refresh
                let executing = self.executing.clone();
                let refresh_tx = self.refresh_tx.clone();
                let scheduled = self.execute_timers.schedule(id, self.execute_settle, move || {
                    set_membership(&executing, id, false);
                    if refresh_tx.send(RefreshReason::ExecutionSettled(id)).is_err() {
                        debug!("Refresh loop gone, dropping post-execute refresh of {}", id);
                    }
                });
                if !scheduled {
                    set_membership(&self.executing, id, false);
                }
                Ok(txid)
            }
            Err(e) => {
                set_membership(&self.executing, id, false);
                error!("❌ Execution of transaction {} failed: {}", id, e);
                self.report(Err(EXECUTE_FAILED));
                Err(e.into())
            }
        }
    }

    /// Validate the raw form and submit it. Nothing reaches the ledger unless
    /// id, amount and recipient all pass.
    pub async fn propose(&self, draft: &ProposalDraft) -> AppResult<TxId> {
        self.ensure_active()?;

        let id = TransactionId::parse_input(&draft.id)?;
        let amount = Amount::from_decimal_input(&draft.amount)?;
        draft.validate().map_err(ValidationError::from)?;
        let to = Principal::new(draft.to.clone());

        match self.gateway.propose(id, &to, amount).await {
            Ok(txid) => {
                info!("📝 Proposed transaction {} for {} units", id, amount);
                self.report(Ok(PROPOSED.to_string()));
                Ok(txid)
            }
            Err(e) => {
                error!("❌ Proposal of transaction {} failed: {}", id, e);
                self.report(Err(PROPOSE_FAILED));
                Err(e.into())
            }
        }
    }

    /// Clipboard failures are logged and otherwise ignored
    pub async fn copy_address(&self, text: &str) -> bool {
        match self.clipboard.write_text(text).await {
            Ok(()) => {
                self.state.write().copied = Some((text.to_string(), Instant::now()));
                true
            }
            Err(e) => {
                warn!("📋 Clipboard write failed: {}", e);
                false
            }
        }
    }

    pub fn sign_in(&self, address: &str) -> Result<Principal, ValidationError> {
        self.identity.begin_sign_in(address)
    }

    /// Signing out is a full reset of local state
    pub fn sign_out(&self) {
        self.identity.sign_out();
        self.tracker.clear();
        let mut state = self.state.write();
        state.success = None;
        state.action_error = None;
        state.copied = None;
    }

    /// Cancel every timer and stop the refresh loop; in-flight results are discarded
    pub fn shutdown(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        self.tracker.teardown();
        self.execute_timers.close();
        if let Some(handle) = self.refresh_loop.lock().take() {
            handle.abort();
        }
        info!("🛑 Transaction board shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::gateway::mock::{tx, Call, MockGateway, PAYOUT_ADDRESS, RECEIVER, SENDER};
    use crate::ledger::gateway::{FN_APPROVE, FN_EXECUTE};
    use crate::ledger::models::Network;
    use crate::reconcile::views::ViewPartition;
    use crate::wallet::{MemoryClipboard, WalletSession};

    fn id(n: u64) -> TransactionId {
        TransactionId::new(n).unwrap()
    }

    fn board() -> (Arc<TransactionBoard>, Arc<MockGateway>, Arc<MemoryClipboard>) {
        let gateway = Arc::new(MockGateway::new());
        let clipboard = Arc::new(MemoryClipboard::new());
        let board = TransactionBoard::new(
            gateway.clone(),
            Arc::new(WalletSession::new(Network::Testnet)),
            clipboard.clone(),
            BoardSettings::default(),
        );
        (board, gateway, clipboard)
    }

    fn draft(id: &str, to: &str, amount: &str) -> ProposalDraft {
        ProposalDraft {
            id: id.to_string(),
            to: to.to_string(),
            amount: amount.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_builds_views() {
        let (board, gateway, _) = board();
        gateway.put(tx(3, 0));
        gateway.put(tx(5, 2));

        let report = board.refresh().await;
        assert!(report.applied);
        assert_eq!(report.resolved, 2);

        let partition = ViewPartition::of(&board.snapshot());
        assert_eq!(partition.pending, vec![id(3)]);
        assert_eq!(partition.ready, vec![id(5)]);
        assert!(!board.notices().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_approve_settles_with_one_refresh() {
        let (board, gateway, _) = board();
        gateway.put(tx(4, 1));
        board.sign_in(SENDER).unwrap();
        board.refresh().await;

        board.approve(id(4)).await.unwrap();
        assert_eq!(
            board.notices().success.as_deref(),
            Some("Transaction 4 is being approved.")
        );
        assert_eq!(board.approval_phases().get(&id(4)), Some(&ApprovalPhase::Approving));
        // Re-approving while still approving replaces the settle timer
        board.approve(id(4)).await.unwrap();

        gateway.put(tx(4, 2));
        tokio::time::sleep(Duration::from_secs(11)).await;

        // One initial batch plus exactly one settle batch
        assert_eq!(gateway.fetch_count(), 20);
        assert!(board.approval_phases().is_empty());
        assert_eq!(ViewPartition::of(&board.snapshot()).ready, vec![id(4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_approve_rolls_back() {
        let (board, gateway, _) = board();
        gateway.put(tx(4, 1));
        gateway.fail_write(FN_APPROVE);
        board.sign_in(SENDER).unwrap();
        board.refresh().await;

        let err = board.approve(id(4)).await.unwrap_err();
        assert!(matches!(err, AppError::Submission(_)));
        assert!(board.approval_phases().is_empty());
        assert_eq!(board.notices().action_error.as_deref(), Some(APPROVE_FAILED));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(gateway.fetch_count(), 10);

        // Re-enabled: the user can simply try again
        gateway.heal_write(FN_APPROVE);
        board.approve(id(4)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_approve_preconditions() {
        let (board, gateway, _) = board();
        gateway.put(tx(4, 1));
        gateway.put(tx(5, 2));
        board.refresh().await;

        assert!(matches!(
            board.approve(id(4)).await,
            Err(AppError::Validation(ValidationError::NotSignedIn))
        ));

        board.sign_in(SENDER).unwrap();
        assert!(matches!(
            board.approve(id(5)).await,
            Err(AppError::Validation(ValidationError::NotPendingApproval(_)))
        ));
        assert!(matches!(
            board.approve(id(9)).await,
            Err(AppError::Validation(ValidationError::NotPendingApproval(_)))
        ));
        assert!(matches!(
            board.approve(id(11)).await,
            Err(AppError::Validation(ValidationError::OutOfRange(_)))
        ));
        assert!(!gateway.calls().iter().any(|c| matches!(c, Call::Approve(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_is_quorum_gated() {
        let (board, gateway, _) = board();
        gateway.put(tx(3, 1));
        gateway.put(tx(5, 2));
        board.refresh().await;

        assert!(matches!(
            board.execute(id(3)).await,
            Err(AppError::Validation(ValidationError::NotExecutable(_)))
        ));

        board.execute(id(5)).await.unwrap();
        assert_eq!(
            board.notices().success.as_deref(),
            Some("Transaction 5 has been executed successfully")
        );
        assert!(board.is_executing(id(5)));
        assert!(matches!(
            board.execute(id(5)).await,
            Err(AppError::Validation(ValidationError::ActionInFlight(_)))
        ));

        // Executed transactions leave the ledger listing
        gateway.remove(id(5));
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(!board.is_executing(id(5)));
        assert!(ViewPartition::of(&board.snapshot()).ready.is_empty());
        assert_eq!(
            gateway.calls().iter().filter(|c| matches!(c, Call::Execute(_))).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_execute_reenables_control() {
        let (board, gateway, _) = board();
        gateway.put(tx(5, 2));
        gateway.fail_write(FN_EXECUTE);
        board.refresh().await;

        assert!(board.execute(id(5)).await.is_err());
        assert!(!board.is_executing(id(5)));
        assert_eq!(board.notices().action_error.as_deref(), Some(EXECUTE_FAILED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_error_only_when_nothing_resolved() {
        let (board, gateway, _) = board();
        for n in 1..=10 {
            gateway.fail_read(id(n));
        }
        board.refresh().await;
        assert_eq!(board.notices().batch_error.as_deref(), Some(BATCH_FAILED));

        gateway.heal_read(id(2));
        gateway.put(tx(2, 0));
        board.refresh().await;
        assert_eq!(board.notices().batch_error, None);
        assert_eq!(board.snapshot().len(), 1);

        // Empty ledger, no failures: not an error
        let (board, _, _) = self::board();
        board.refresh().await;
        assert_eq!(board.notices().batch_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_batch_is_dropped() {
        let (board, gateway, _) = board();
        gateway.delay_read(id(1), Duration::from_secs(5));

        let (slow, fast) = tokio::join!(board.refresh(), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            gateway.delay_read(id(1), Duration::ZERO);
            gateway.put(tx(2, 1));
            board.refresh().await
        });

        assert!(fast.applied);
        assert!(!slow.applied);
        assert!(board.snapshot().get(id(2)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_after_shutdown_are_discarded() {
        let (board, gateway, _) = board();
        gateway.put(tx(1, 0));

        let (report, _) = tokio::join!(board.refresh(), async { board.shutdown() });
        assert!(!report.applied);
        assert!(board.snapshot().is_empty());
        assert!(board.approve(id(1)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_propose_validation() {
        let (board, gateway, _) = board();

        for bad in [
            draft("1", PAYOUT_ADDRESS, "0"),
            draft("1", PAYOUT_ADDRESS, "-2"),
            draft("0", PAYOUT_ADDRESS, "1"),
            draft("x", PAYOUT_ADDRESS, "1"),
            draft("1", "", "1"),
            draft("1", &"a".repeat(35), "1"),
            draft("1", "bc1qé", "1"),
        ] {
            assert!(matches!(board.propose(&bad).await, Err(AppError::Validation(_))));
        }
        assert!(gateway.calls().is_empty());

        board.propose(&draft("7", PAYOUT_ADDRESS, "0.00000001")).await.unwrap();
        assert_eq!(
            gateway.calls(),
            vec![Call::Propose(id(7), Principal::new(PAYOUT_ADDRESS), Amount::from_units(1))]
        );
        assert_eq!(board.notices().success.as_deref(), Some(PROPOSED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_propose_rejects_recipient_longer_than_contract_field() {
        let (board, gateway, _) = board();

        // A full Stacks principal is 41 characters
        let err = board.propose(&draft("7", RECEIVER, "1")).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::InvalidRecipient(_))
        ));
        assert!(gateway.calls().is_empty());
        assert_eq!(board.notices(), Notices::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_copied_indicator_expires() {
        let (board, _, clipboard) = board();

        assert!(board.copy_address(SENDER).await);
        assert_eq!(clipboard.last().as_deref(), Some(SENDER));
        assert_eq!(board.notices().copied.as_deref(), Some(SENDER));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(board.notices().copied, None);

        // Failure is non-critical
        assert!(!board.copy_address("").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_resets_overlays() {
        let (board, gateway, _) = board();
        gateway.put(tx(4, 1));
        board.sign_in(SENDER).unwrap();
        board.refresh().await;
        board.approve(id(4)).await.unwrap();

        board.sign_out();
        assert!(board.identity().is_none());
        assert!(board.approval_phases().is_empty());
        assert_eq!(board.notices().success, None);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(gateway.fetch_count(), 10);
    }
}
