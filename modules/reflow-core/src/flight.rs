//! In-flight tracking and the exhaustion wait (test instrumentation).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::trace;
use uuid::Uuid;

use crate::error::ExhaustTimeout;

/// Counts outstanding actions/effects for one loop instance.
///
/// Inert until [`enable`](Self::enable) is called. Every counter mutation and
/// the zero-check that releases waiters happen under a single lock, so a
/// settlement can never race past a registering waiter.
#[derive(Default)]
pub struct FlightTracker {
    enabled: AtomicBool,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    count: u64,
    waiters: HashMap<Uuid, oneshot::Sender<()>>,
}

impl FlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opt this instance into tracking. Actions admitted before this call are
    /// not counted, so enable before the first `send`.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Current in-flight count (zero when tracking is disabled).
    pub fn in_flight(&self) -> u64 {
        self.lock().count
    }

    /// One admission: exactly one matching [`settle`](Self::settle) follows.
    pub fn admit(&self) {
        if !self.is_enabled() {
            return;
        }
        let mut inner = self.lock();
        inner.count += 1;
        trace!(in_flight = inner.count, "action admitted");
    }

    /// One settlement. On the transition to exactly zero, every pending
    /// waiter is released successfully in the same critical section.
    pub fn settle(&self) {
        if !self.is_enabled() {
            return;
        }
        let mut inner = self.lock();
        debug_assert!(inner.count > 0, "settle without a matching admit");
        inner.count = inner.count.saturating_sub(1);
        trace!(in_flight = inner.count, "work settled");
        if inner.count == 0 {
            for (_, waiter) in inner.waiters.drain() {
                let _ = waiter.send(());
            }
        }
    }

    /// Suspend until the counter returns to zero or `timeout` elapses.
    ///
    /// Any number of waiters may be outstanding at once; all are released
    /// together on settlement. Tracker teardown also releases them, without
    /// error.
    ///
    /// # Panics
    ///
    /// If tracking was never enabled, or nothing is in flight — both are
    /// usage bugs in the calling test, not runtime conditions.
    pub async fn exhaust(&self, timeout: Duration) -> Result<(), ExhaustTimeout> {
        assert!(
            self.is_enabled(),
            "call enable_test_mode() before exhaust()"
        );
        let (id, rx) = {
            let mut inner = self.lock();
            assert!(
                inner.count > 0,
                "nothing in flight: exhaust() would wait forever"
            );
            let id = Uuid::new_v4();
            let (tx, rx) = oneshot::channel();
            inner.waiters.insert(id, tx);
            (id, rx)
        };
        match tokio::time::timeout(timeout, rx).await {
            // Settled, or the owning loop was torn down: both resolve cleanly.
            Ok(_) => Ok(()),
            Err(_) => {
                self.lock().waiters.remove(&id);
                Err(ExhaustTimeout)
            }
        }
    }

    /// Teardown path: resolve every pending waiter successfully.
    pub fn release_all(&self) {
        for (_, waiter) in self.lock().waiters.drain() {
            let _ = waiter.send(());
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
