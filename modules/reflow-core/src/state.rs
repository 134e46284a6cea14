//! State snapshots and their change streams.

use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

/// Holds the current state snapshot and fans out every published update to
/// subscribers, in publication order.
///
/// Publication happens only from the owning loop's consumer; subscription and
/// teardown are safe from arbitrary threads.
pub struct StateCell<S> {
    current: Mutex<S>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<S>>>,
}

impl<S: Clone> StateCell<S> {
    pub fn new(initial: S) -> Self {
        Self {
            current: Mutex::new(initial),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Clone of the current snapshot.
    pub fn snapshot(&self) -> S {
        lock(&self.current).clone()
    }

    /// Subscribe to the change stream.
    ///
    /// The current snapshot is replayed as the first item, then every
    /// published update follows in order.
    pub fn subscribe(&self) -> StateChanges<S> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(self.snapshot());
        lock(&self.subscribers).push(tx);
        StateChanges { rx }
    }

    /// Replace the snapshot and notify subscribers. Dead entries are pruned.
    pub(crate) fn publish(&self, next: S) {
        *lock(&self.current) = next.clone();
        lock(&self.subscribers).retain(|tx| tx.send(next.clone()).is_ok());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ordered, unbounded stream of state snapshots.
pub struct StateChanges<S> {
    rx: mpsc::UnboundedReceiver<S>,
}

impl<S> StateChanges<S> {
    /// Next snapshot, or `None` once the cell is gone.
    pub async fn recv(&mut self) -> Option<S> {
        self.rx.recv().await
    }

    /// Project each snapshot and suppress consecutive duplicates.
    pub fn distinct_by<T, F>(self, project: F) -> DistinctChanges<S, T, F>
    where
        T: Clone + PartialEq,
        F: FnMut(&S) -> T,
    {
        DistinctChanges {
            inner: self,
            project,
            last: None,
        }
    }
}

impl<S> Stream for StateChanges<S> {
    type Item = S;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S>> {
        self.rx.poll_recv(cx)
    }
}

/// Equality-deduplicated projection over a [`StateChanges`] stream.
///
/// Yields the projected value only when it differs from the previously
/// yielded one; the replayed initial snapshot counts as the first emission.
pub struct DistinctChanges<S, T, F> {
    inner: StateChanges<S>,
    project: F,
    last: Option<T>,
}

impl<S, T, F> DistinctChanges<S, T, F>
where
    T: Clone + PartialEq,
    F: FnMut(&S) -> T,
{
    pub async fn recv(&mut self) -> Option<T> {
        while let Some(state) = self.inner.recv().await {
            let next = (self.project)(&state);
            if self.last.as_ref() != Some(&next) {
                self.last = Some(next.clone());
                return Some(next);
            }
        }
        None
    }
}
