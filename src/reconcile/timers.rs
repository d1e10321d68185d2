// Single-shot timers keyed by transaction id
//
// - At most one outstanding timer per id; scheduling again aborts the previous task
// - A fired task only acts if it still owns the slot (token match)
// - After `close` nothing can be scheduled and nothing can fire

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::ledger::models::TransactionId;

#[derive(Clone)]
struct TimerEntry {
    token: u64,
    handle: AbortHandle,
}

type Table = Arc<HashMap<TransactionId, TimerEntry>>;

pub struct TimerTable {
    label: &'static str,
    /// Replaced wholesale on every change
    entries: RwLock<Table>,
    next_token: AtomicU64,
    closed: AtomicBool,
}

impl TimerTable {
    pub fn new(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            entries: RwLock::new(Arc::new(HashMap::new())),
            next_token: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    /// Run `on_fire` once after `delay`, replacing any timer already set for `id`.
    /// Returns `false` if the table is closed.
    pub fn schedule<F>(self: &Arc<Self>, id: TransactionId, delay: Duration, on_fire: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        // Hold the write lock until the entry is in place so the task can't
        // look for its slot before it exists
        let mut entries = self.entries.write();
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let table = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if table.retire(id, token) {
                debug!("⏰ {} timer fired for transaction {}", table.label, id);
                on_fire();
            }
        });

        let mut next = HashMap::clone(&entries);
        if let Some(previous) = next.insert(
            id,
            TimerEntry {
                token,
                handle: task.abort_handle(),
            },
        ) {
            previous.handle.abort();
            debug!("{} timer for transaction {} rescheduled", self.label, id);
        }
        *entries = Arc::new(next);
        true
    }

    /// Remove the slot if `token` still owns it
    fn retire(&self, id: TransactionId, token: u64) -> bool {
        let mut entries = self.entries.write();
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        match entries.get(&id) {
            Some(entry) if entry.token == token => {
                let mut next = HashMap::clone(&entries);
                next.remove(&id);
                *entries = Arc::new(next);
                true
            }
            _ => false,
        }
    }

    pub fn cancel_all(&self) {
        let mut entries = self.entries.write();
        for entry in entries.values() {
            entry.handle.abort();
        }
        if !entries.is_empty() {
            debug!("Cancelled {} {} timer(s)", entries.len(), self.label);
        }
        *entries = Arc::new(HashMap::new());
    }

    /// Cancel everything and refuse further scheduling
    pub fn close(&self) {
        // Set under the lock so an in-flight `schedule` can't slip past
        let entries = self.entries.write();
        self.closed.store(true, Ordering::Release);
        drop(entries);
        self.cancel_all();
    }

    #[cfg(test)]
    pub fn is_scheduled(&self, id: TransactionId) -> bool {
        self.entries.read().contains_key(&id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn id(n: u64) -> TransactionId {
        TransactionId::new(n).unwrap()
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = fired.clone();
        (fired, move || {
            let fired = handle.clone();
            Box::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_fires_once() {
        let timers = TimerTable::new("test");
        let (fired, make) = counter();

        for _ in 0..3 {
            assert!(timers.schedule(id(1), Duration::from_secs(10), make()));
            tokio::time::sleep(Duration::from_secs(4)).await;
        }
        assert_eq!(timers.len(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_scheduled(id(1)));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_ids() {
        let timers = TimerTable::new("test");
        let (fired, make) = counter();

        timers.schedule(id(1), Duration::from_secs(1), make());
        timers.schedule(id(2), Duration::from_secs(3), make());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_scheduled(id(1)));
        assert!(timers.is_scheduled(id(2)));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert!(!timers.is_scheduled(id(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_fires_after_close() {
        let timers = TimerTable::new("test");
        let (fired, make) = counter();

        timers.schedule(id(1), Duration::from_secs(1), make());
        timers.schedule(id(2), Duration::from_secs(1), make());
        timers.close();
        assert!(!timers.schedule(id(3), Duration::from_secs(1), make()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
