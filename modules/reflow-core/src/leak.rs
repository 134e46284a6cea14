//! Object-lifetime checks for test harnesses.
//!
//! A weak-keyed registry: register a shared handle, then after the owner is
//! expected to have dropped it, `expect_released` verifies the object is
//! actually gone. Feature-gated (`leak-probe`); nothing in the runtime
//! depends on this module.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
pub struct LeakProbe {
    entries: Mutex<HashMap<Uuid, Weak<dyn Any + Send + Sync>>>,
}

impl LeakProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `handle` without extending its lifetime. Returns the entry key.
    pub fn register<T: Any + Send + Sync>(&self, handle: &Arc<T>) -> Uuid {
        let key = Uuid::new_v4();
        let weak: Weak<dyn Any + Send + Sync> = Arc::downgrade(handle);
        self.lock().insert(key, weak);
        debug!(key = %key, "lifetime registered");
        key
    }

    /// Explicit deregistration for objects that legitimately outlive a test.
    pub fn remove(&self, key: Uuid) {
        self.lock().remove(&key);
    }

    /// After `grace`, panic if the registered object is still alive.
    ///
    /// The entry is consumed either way. Await the returned handle so the
    /// test observes the verdict.
    pub fn expect_released(self: &Arc<Self>, key: Uuid, grace: Duration) -> JoinHandle<()> {
        let probe = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let entry = probe.lock().remove(&key);
            if let Some(weak) = entry {
                assert!(
                    weak.upgrade().is_none(),
                    "leaked object: still alive after grace period ({key})"
                );
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Weak<dyn Any + Send + Sync>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
