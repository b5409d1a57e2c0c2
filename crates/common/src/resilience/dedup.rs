//! In-flight request deduplication
//!
//! Concurrent callers presenting the same key share a single execution of
//! the underlying future and all observe its (cloned) output. An entry is
//! removed as soon as its execution completes; entries older than the
//! configured window are ignored even if still pending, so a stuck call can
//! never capture a key forever.
//!
//! Entries hold only a weak handle to the shared future. The execution is
//! driven by whichever waiters are still interested: a waiter that is
//! dropped detaches without affecting the others, and once every waiter is
//! gone the execution and its entry are dropped with them.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use tokio::time::Instant;
use tracing::trace;

type SharedExecution<T> = Shared<BoxFuture<'static, T>>;

struct InFlight<T> {
    id: u64,
    started: Instant,
    execution: Option<WeakShared<BoxFuture<'static, T>>>,
}

impl<T> InFlight<T> {
    fn live(&self, window: Duration) -> Option<SharedExecution<T>> {
        if self.started.elapsed() >= window {
            return None;
        }
        self.execution.as_ref()?.upgrade()
    }

    fn abandoned(&self) -> bool {
        self.execution.as_ref().and_then(WeakShared::upgrade).is_none()
    }
}

/// One caller's handle on a shared execution. Dropping it before the
/// execution completes removes the entry if no other caller is left.
struct Waiter<K: Eq + Hash, T> {
    entries: Arc<DashMap<K, InFlight<T>>>,
    key: K,
    id: u64,
    execution: Option<SharedExecution<T>>,
}

// No field is structurally pinned.
impl<K: Eq + Hash, T> Unpin for Waiter<K, T> {}

impl<K: Eq + Hash, T: Clone> Future for Waiter<K, T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        // Polled again after completion.
        let Some(execution) = self.execution.as_mut() else {
            return Poll::Pending;
        };
        let output = ready!(execution.poll_unpin(cx));
        self.execution = None;
        Poll::Ready(output)
    }
}

impl<K: Eq + Hash, T> Drop for Waiter<K, T> {
    fn drop(&mut self) {
        let Some(execution) = self.execution.take() else {
            return;
        };
        drop(execution);
        let id = self.id;
        if self.entries.remove_if(&self.key, |_, entry| entry.id == id && entry.abandoned()).is_some()
        {
            trace!("dedup entry abandoned by every waiter");
        }
    }
}

/// Whether a call started a new execution or joined an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupRole {
    Leader,
    Follower,
}

/// Collapses concurrent identical operations into one execution.
///
/// Cloning shares the same in-flight table.
pub struct RequestDeduplicator<K, T> {
    entries: Arc<DashMap<K, InFlight<T>>>,
    window: Duration,
    next_id: Arc<AtomicU64>,
}

impl<K, T> Clone for RequestDeduplicator<K, T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            window: self.window,
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<K, T> fmt::Debug for RequestDeduplicator<K, T>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDeduplicator")
            .field("pending", &self.entries.len())
            .field("window", &self.window)
            .finish()
    }
}

impl<K, T> RequestDeduplicator<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            window,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Run `make()` unless an execution for `key` is already in flight, in
    /// which case wait for that execution instead.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.run_with_role(key, make).await.0
    }

    /// Like [`run`](Self::run), also reporting whether this caller led the
    /// execution.
    pub async fn run_with_role<F, Fut>(&self, key: K, make: F) -> (T, DedupRole)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (execution, id, role) = match self.entries.entry(key.clone()) {
            MapEntry::Occupied(mut occupied) => match occupied.get().live(self.window) {
                Some(execution) => (execution, occupied.get().id, DedupRole::Follower),
                None => {
                    let (entry, execution) = self.start(key.clone(), make);
                    let id = entry.id;
                    occupied.insert(entry);
                    (execution, id, DedupRole::Leader)
                }
            },
            MapEntry::Vacant(vacant) => {
                let (entry, execution) = self.start(key.clone(), make);
                let id = entry.id;
                vacant.insert(entry);
                (execution, id, DedupRole::Leader)
            }
        };

        trace!(?role, "dedup admission");
        let waiter =
            Waiter { entries: Arc::clone(&self.entries), key, id, execution: Some(execution) };
        (waiter.await, role)
    }

    fn start<F, Fut>(&self, key: K, make: F) -> (InFlight<T>, SharedExecution<T>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entries = Arc::clone(&self.entries);
        let fut = make();

        let execution = async move {
            let output = fut.await;
            // A newer entry may have replaced ours after the window lapsed.
            entries.remove_if(&key, |_, entry| entry.id == id);
            output
        }
        .boxed()
        .shared();

        let entry = InFlight {
            id,
            started: Instant::now(),
            execution: execution.downgrade(),
        };
        (entry, execution)
    }

    /// Number of entries currently tracked, including ones whose window
    /// lapsed while their execution is still running.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if a live (unexpired, still awaited) execution exists for `key`.
    pub fn is_pending(&self, key: &K) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.live(self.window).is_some())
    }

    /// Forget every entry. Callers already waiting keep their outcome; new
    /// callers start fresh executions.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for resilience::dedup.
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_call(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
        value: u32,
    ) -> impl Future<Output = Arc<u32>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Arc::new(value)
        }
    }

    /// Validates `RequestDeduplicator::run` for concurrent identical keys.
    ///
    /// Assertions:
    /// - Exactly one execution happens.
    /// - Both callers receive the same `Arc` (pointer-equal).
    /// - The entry is removed once the execution completes.
    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_execution() {
        let dedup: RequestDeduplicator<&'static str, Arc<u32>> =
            RequestDeduplicator::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            dedup.run_with_role("GET /tasks", || counting_call(
                &calls,
                Duration::from_millis(100),
                1
            )),
            dedup.run_with_role("GET /tasks", || counting_call(
                &calls,
                Duration::from_millis(100),
                2
            )),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(*a.0, 1);
        assert_eq!((a.1, b.1), (DedupRole::Leader, DedupRole::Follower));
        assert!(dedup.is_empty());
    }

    /// Validates that different keys never share an execution.
    ///
    /// Assertions:
    /// - Two distinct keys run two executions.
    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_run_separately() {
        let dedup: RequestDeduplicator<String, Arc<u32>> =
            RequestDeduplicator::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            dedup.run("page=1".to_string(), || counting_call(&calls, Duration::from_millis(10), 1)),
            dedup.run("page=2".to_string(), || counting_call(&calls, Duration::from_millis(10), 2)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!((*a, *b), (1, 2));
    }

    /// Validates the window safety valve for a stuck execution.
    ///
    /// Assertions:
    /// - A caller arriving after the window starts a new execution.
    /// - The stale execution's completion does not evict the new entry.
    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_replaced() {
        let dedup: RequestDeduplicator<&'static str, Arc<u32>> =
            RequestDeduplicator::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));

        let slow = {
            let dedup = dedup.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                dedup.run("k", || counting_call(&calls, Duration::from_secs(20), 1)).await
            })
        };
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!dedup.is_pending(&"k"));

        let fresh = {
            let dedup = dedup.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                dedup.run("k", || counting_call(&calls, Duration::from_secs(20), 2)).await
            })
        };
        tokio::time::sleep(Duration::from_secs(15)).await;
        // The slow call finished; the fresh one is still tracked.
        assert_eq!(*slow.await.unwrap(), 1);
        assert_eq!(dedup.len(), 1);

        assert_eq!(*fresh.await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(dedup.is_empty());
    }

    /// Validates that a cancelled leader does not disturb followers.
    ///
    /// Assertions:
    /// - The follower still receives the result of the single execution.
    #[tokio::test(start_paused = true)]
    async fn test_cancelled_leader_keeps_followers() {
        let dedup: RequestDeduplicator<&'static str, Arc<u32>> =
            RequestDeduplicator::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let dedup = dedup.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                dedup.run("k", || counting_call(&calls, Duration::from_millis(100), 7)).await
            })
        };
        tokio::task::yield_now().await;

        let follower = {
            let dedup = dedup.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                dedup.run("k", || counting_call(&calls, Duration::from_millis(100), 8)).await
            })
        };
        tokio::task::yield_now().await;

        leader.abort();
        assert_eq!(*follower.await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Validates `clear`.
    ///
    /// Assertions:
    /// - `clear` forgets entries so the next call executes again.
    #[tokio::test(start_paused = true)]
    async fn test_clear_forgets_entries() {
        let dedup: RequestDeduplicator<&'static str, Arc<u32>> =
            RequestDeduplicator::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let dedup = dedup.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                dedup.run("k", || counting_call(&calls, Duration::from_millis(100), 1)).await
            })
        };
        tokio::task::yield_now().await;
        assert!(dedup.is_pending(&"k"));

        dedup.clear();
        assert!(dedup.is_empty());

        let second = dedup.run("k", || counting_call(&calls, Duration::from_millis(100), 2)).await;
        assert_eq!(*second, 2);
        assert_eq!(*first.await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Validates cleanup when every waiter for a key is cancelled.
    ///
    /// Assertions:
    /// - The entry is removed once the last waiter is gone.
    /// - Entries for other keys are untouched.
    /// - The next call for the key starts a fresh execution.
    #[tokio::test(start_paused = true)]
    async fn test_abandoned_entry_is_removed() {
        let dedup: RequestDeduplicator<&'static str, Arc<u32>> =
            RequestDeduplicator::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));

        let spawn_run = |key: &'static str, value: u32| {
            let dedup = dedup.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                dedup.run(key, || counting_call(&calls, Duration::from_secs(1), value)).await
            })
        };
        let first = spawn_run("k", 1);
        let second = spawn_run("k", 2);
        let other = spawn_run("other", 3);
        tokio::task::yield_now().await;
        assert_eq!(dedup.len(), 2);

        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());
        assert_eq!(dedup.len(), 2);

        second.abort();
        assert!(second.await.unwrap_err().is_cancelled());
        assert_eq!(dedup.len(), 1);
        assert!(!dedup.is_pending(&"k"));

        assert_eq!(*other.await.unwrap(), 3);
        assert!(dedup.is_empty());

        let fresh = dedup.run("k", || counting_call(&calls, Duration::from_millis(10), 4)).await;
        assert_eq!(*fresh, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
