//! Effects: asynchronous follow-up work returned from a reduce step.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::flight::FlightTracker;

/// Advisory scheduling hint for an effect body.
///
/// Tokio's scheduler has no priority lanes; the hint is recorded on the
/// effect's tracing span so runs can be distinguished in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    UserInitiated,
    #[default]
    Utility,
    Background,
}

/// Boxed effect body: receives the send capability back into the owning loop.
pub type EffectFn<A> = Box<dyn FnOnce(ActionSender<A>) -> BoxFuture<'static, ()> + Send>;

/// A side effect returned from [`Reducer::reduce`](crate::Reducer::reduce).
///
/// `None` means the action is fully handled once the state mutation lands.
/// `Run` spawns the body as a detached task; it may call `send` on the
/// provided capability any number of times before returning.
pub enum Effect<A> {
    None,
    Run { priority: Priority, task: EffectFn<A> },
}

impl<A> Effect<A> {
    /// An effect at the default priority.
    pub fn run<F, Fut>(task: F) -> Self
    where
        F: FnOnce(ActionSender<A>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::run_at(Priority::default(), task)
    }

    /// An effect with an explicit priority hint.
    pub fn run_at<F, Fut>(priority: Priority, task: F) -> Self
    where
        F: FnOnce(ActionSender<A>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Effect::Run {
            priority,
            task: Box::new(move |send| task(send).boxed()),
        }
    }
}

/// Clonable send capability handed to effect bodies and UI adapters.
///
/// Holds a weak channel handle so outstanding detached tasks never keep a
/// discarded loop alive. Sending to a closed loop is a traced no-op.
pub struct ActionSender<A> {
    tx: mpsc::WeakUnboundedSender<A>,
    flight: Arc<FlightTracker>,
}

impl<A> Clone for ActionSender<A> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            flight: Arc::clone(&self.flight),
        }
    }
}

impl<A: Send + 'static> ActionSender<A> {
    pub(crate) fn new(tx: mpsc::WeakUnboundedSender<A>, flight: Arc<FlightTracker>) -> Self {
        Self { tx, flight }
    }

    /// Admit a derived action into the owning loop's channel.
    ///
    /// Never blocks. Derived actions are ordered relative to each other and
    /// to anything else admitted after this call, and are tracked like any
    /// directly sent action.
    pub fn send(&self, action: A) {
        let Some(tx) = self.tx.upgrade() else {
            debug!("derived action dropped: loop closed");
            return;
        };
        self.flight.admit();
        if tx.send(action).is_err() {
            self.flight.settle();
            debug!("derived action dropped: consumer gone");
        }
    }
}
