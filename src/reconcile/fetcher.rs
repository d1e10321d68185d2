use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::ReadError;
use crate::ledger::models::{ScanRange, Transaction, TransactionId};
use crate::ledger::LedgerGateway;

/// Immutable point-in-time read of every resolved transaction, ordered by id
#[derive(Debug, Clone)]
pub struct Snapshot {
    transactions: BTreeMap<TransactionId, Transaction>,
    fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            transactions: BTreeMap::new(),
            fetched_at: Utc::now(),
        }
    }

    pub fn from_transactions(transactions: impl IntoIterator<Item = Transaction>) -> Self {
        Self {
            transactions: transactions.into_iter().map(|tx| (tx.id, tx)).collect(),
            fetched_at: Utc::now(),
        }
    }

    pub fn get(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Result of one settled batch
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub snapshot: Snapshot,
    /// Reads that degraded to absent because they failed
    pub failures: Vec<ReadError>,
}

impl FetchOutcome {
    /// Nothing resolved and at least one read failed
    pub fn is_unavailable(&self) -> bool {
        self.snapshot.is_empty() && !self.failures.is_empty()
    }
}

/// Scatter/gather reader over the scan window
pub struct SnapshotFetcher {
    gateway: Arc<dyn LedgerGateway>,
    range: ScanRange,
}

impl SnapshotFetcher {
    pub fn new(gateway: Arc<dyn LedgerGateway>, range: ScanRange) -> Self {
        Self { gateway, range }
    }

    pub fn range(&self) -> ScanRange {
        self.range
    }

    pub async fn fetch_all(&self) -> FetchOutcome {
        debug!("Scanning {} id(s) of {:?}", self.range.len(), self.range);
        self.fetch(self.range.ids()).await
    }

    /// Read every candidate concurrently and wait for all of them to settle.
    /// Candidates outside the scan range are never read.
    pub async fn fetch(&self, candidates: impl IntoIterator<Item = TransactionId>) -> FetchOutcome {
        let (in_range, skipped): (BTreeSet<_>, BTreeSet<_>) = candidates
            .into_iter()
            .partition(|id| self.range.contains(*id));

        if !skipped.is_empty() {
            debug!("Skipping {} id(s) outside the scan range", skipped.len());
        }

        let reads = in_range.iter().map(|&id| {
            let gateway = self.gateway.clone();
            async move { (id, gateway.fetch_by_id(id).await) }
        });
        let settled = join_all(reads).await;

        let mut transactions = Vec::with_capacity(settled.len());
        let mut failures = Vec::new();

        for (id, result) in settled {
            match result {
                Ok(Some(tx)) => {
                    if !tx.flags_agree_with_count() {
                        debug!("Transaction {} approval flags lag its count", id);
                    }
                    transactions.push(tx)
                }
                Ok(None) => debug!("No ledger record for transaction {}", id),
                Err(e) => {
                    warn!("⚠️ Read of transaction {} degraded to absent: {}", e.id(), e);
                    failures.push(e);
                }
            }
        }

        info!(
            "📥 Fetched {} transaction(s), {} read failure(s)",
            transactions.len(),
            failures.len()
        );

        FetchOutcome {
            snapshot: Snapshot::from_transactions(transactions),
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::gateway::mock::{tx, Call, MockGateway};

    fn id(n: u64) -> TransactionId {
        TransactionId::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_failures_degrade_single_ids() {
        let gateway = Arc::new(MockGateway::new());
        gateway.put(tx(1, 0));
        gateway.put(tx(2, 1));
        gateway.put(tx(3, 2));
        gateway.fail_read(id(2));

        let fetcher = SnapshotFetcher::new(gateway.clone(), ScanRange::default());
        let outcome = fetcher.fetch_all().await;

        assert_eq!(gateway.fetch_count(), 10);
        assert_eq!(outcome.snapshot.len(), 2);
        assert!(outcome.snapshot.get(id(1)).is_some());
        assert!(outcome.snapshot.get(id(2)).is_none());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].id(), id(2));
        assert!(!outcome.is_unavailable());
    }

    #[tokio::test]
    async fn test_never_reads_outside_range() {
        let gateway = Arc::new(MockGateway::new());
        gateway.put(tx(11, 0));
        gateway.put(tx(4, 1));

        let fetcher = SnapshotFetcher::new(gateway.clone(), ScanRange::default());
        let outcome = fetcher.fetch([id(4), id(11), id(40), id(4)]).await;

        assert_eq!(gateway.calls(), vec![Call::Fetch(id(4))]);
        assert_eq!(outcome.snapshot.len(), 1);
        assert!(outcome.snapshot.get(id(11)).is_none());
    }

    #[tokio::test]
    async fn test_missing_records_are_not_errors() {
        let gateway = Arc::new(MockGateway::new());
        let fetcher = SnapshotFetcher::new(gateway, ScanRange::default());

        let outcome = fetcher.fetch_all().await;
        assert!(outcome.snapshot.is_empty());
        assert!(outcome.failures.is_empty());
        assert!(!outcome.is_unavailable());
    }

    #[tokio::test]
    async fn test_all_failed_is_unavailable() {
        let gateway = Arc::new(MockGateway::new());
        gateway.put(tx(1, 0));
        for n in 1..=3 {
            gateway.fail_read(id(n));
        }

        let fetcher = SnapshotFetcher::new(gateway, ScanRange::new(1, 3).unwrap());
        let outcome = fetcher.fetch_all().await;
        assert_eq!(outcome.failures.len(), 3);
        assert!(outcome.is_unavailable());
    }
}
