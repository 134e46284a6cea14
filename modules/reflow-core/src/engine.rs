//! The action loop: single consumer, exclusive state, effect dispatch.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, debug_span, warn, Instrument};

use crate::effect::{ActionSender, Effect};
use crate::error::ExhaustTimeout;
use crate::flight::FlightTracker;
use crate::state::{StateCell, StateChanges};

/// The sole user-supplied hook: a pure transition over owned state.
///
/// `reduce` runs on the loop's single consumer with exclusive access to the
/// state; no other action's transition for the same core runs concurrently.
/// It must not block or await — long-running work belongs in the returned
/// effect's body.
pub trait Reducer: Send + 'static {
    type Action: Send + 'static;
    type State: Clone + PartialEq + Send + Sync + 'static;

    fn reduce(&mut self, state: &mut Self::State, action: Self::Action) -> Effect<Self::Action>;

    /// Runs once when the consumer starts, before the first action.
    fn did_become_active(&mut self) {}

    /// Runs once when the channel closes, after the last queued action.
    fn will_resign_active(&mut self) {}
}

/// A reducer loop: owns a [`StateCell`] and an ordered action channel.
///
/// Actions sent from the same caller context are processed FIFO. Effects run
/// as detached tasks whose derived actions re-enter the same channel, so they
/// are ordered and tracked like any other action. Dropping the core closes
/// the channel; queued actions still reach `reduce`, detached effect tasks
/// are not force-terminated, and outstanding exhaust waiters are released
/// without error.
pub struct Core<R: Reducer> {
    cell: Arc<StateCell<R::State>>,
    tx: mpsc::UnboundedSender<R::Action>,
    flight: Arc<FlightTracker>,
    seed: Mutex<Option<Seed<R>>>,
}

/// Consumer ingredients, parked until the first `send`.
struct Seed<R: Reducer> {
    reducer: R,
    rx: mpsc::UnboundedReceiver<R::Action>,
    state: R::State,
}

impl<R: Reducer> Core<R> {
    pub fn new(reducer: R, initial_state: R::State) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            cell: Arc::new(StateCell::new(initial_state.clone())),
            tx,
            flight: Arc::new(FlightTracker::new()),
            seed: Mutex::new(Some(Seed {
                reducer,
                rx,
                state: initial_state,
            })),
        }
    }

    /// Admit an action. Never blocks; the consumer task starts lazily on the
    /// first call.
    pub fn send(&self, action: R::Action) {
        self.ensure_consumer();
        self.flight.admit();
        if self.tx.send(action).is_err() {
            self.flight.settle();
            warn!("action dropped: consumer is gone");
        }
    }

    /// Clone of the current state snapshot.
    pub fn state(&self) -> R::State {
        self.cell.snapshot()
    }

    /// Subscribe to the state change stream (current snapshot replayed
    /// first). Use [`StateChanges::distinct_by`] for deduplicated
    /// projections.
    pub fn changes(&self) -> StateChanges<R::State> {
        self.cell.subscribe()
    }

    /// Send capability for UI adapters and wiring; safe to hold beyond the
    /// core's lifetime.
    pub fn sender(&self) -> ActionSender<R::Action> {
        ActionSender::new(self.tx.downgrade(), Arc::clone(&self.flight))
    }

    /// Opt into in-flight tracking. Call before the first `send`.
    pub fn enable_test_mode(&self) {
        self.flight.enable();
    }

    /// Wait until every admitted action and its effects settle, or until
    /// `timeout`. The returned future does not borrow the core, so teardown
    /// during a wait releases the waiter instead of hanging it.
    ///
    /// # Panics
    ///
    /// If test mode is not enabled, or nothing is in flight (see
    /// [`FlightTracker::exhaust`]).
    pub fn exhaust(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ExhaustTimeout>> + Send + 'static {
        let flight = Arc::clone(&self.flight);
        async move { flight.exhaust(timeout).await }
    }

    pub(crate) fn cell(&self) -> &Arc<StateCell<R::State>> {
        &self.cell
    }

    fn ensure_consumer(&self) {
        let seed = {
            let mut slot = self.seed.lock().unwrap_or_else(|p| p.into_inner());
            slot.take()
        };
        let Some(seed) = seed else { return };
        let cell = Arc::clone(&self.cell);
        let flight = Arc::clone(&self.flight);
        let weak_tx = self.tx.downgrade();
        tokio::spawn(run_loop(seed, cell, flight, weak_tx));
    }
}

impl<R: Reducer> Drop for Core<R> {
    fn drop(&mut self) {
        // The channel closes when `tx` drops; waiters must not hang on work
        // that will never be counted down.
        self.flight.release_all();
    }
}

async fn run_loop<R: Reducer>(
    mut seed: Seed<R>,
    cell: Arc<StateCell<R::State>>,
    flight: Arc<FlightTracker>,
    weak_tx: mpsc::WeakUnboundedSender<R::Action>,
) {
    seed.reducer.did_become_active();

    while let Some(action) = seed.rx.recv().await {
        let effect = seed.reducer.reduce(&mut seed.state, action);
        cell.publish(seed.state.clone());

        match effect {
            Effect::None => flight.settle(),
            Effect::Run { priority, task } => {
                let sender = ActionSender::new(weak_tx.clone(), Arc::clone(&flight));
                let flight = Arc::clone(&flight);
                let span = debug_span!("effect", priority = ?priority);
                tokio::spawn(
                    async move {
                        debug!("effect started");
                        // A panicking body still settles its slot; the loop
                        // itself is unaffected.
                        if AssertUnwindSafe(task(sender)).catch_unwind().await.is_err() {
                            warn!("effect body panicked");
                        }
                        flight.settle();
                        debug!("effect done");
                    }
                    .instrument(span),
                );
            }
        }
    }

    seed.reducer.will_resign_active();
    debug!("consumer stopped: channel closed");
}
