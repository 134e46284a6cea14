//! Integration tests for the Core action loop: ordering, settlement,
//! effect gating, and teardown behavior.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reflow_core::{Core, Effect, ExhaustTimeout, Priority, Reducer};

// ---------------------------------------------------------------------------
// Test reducer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
struct RelayState {
    seen: Vec<String>,
    working: bool,
}

#[derive(Debug)]
enum RelayAction {
    Note(&'static str),
    /// Spawns an effect that emits `WorkDone` after `delay`.
    Work { delay: Duration },
    /// Spawns an effect that emits two derived notes back to back.
    FanOut,
    /// Spawns an effect whose body panics without sending anything.
    Explode,
    WorkDone,
}

struct RelayReducer;

impl Reducer for RelayReducer {
    type Action = RelayAction;
    type State = RelayState;

    fn reduce(&mut self, state: &mut RelayState, action: RelayAction) -> Effect<RelayAction> {
        match action {
            RelayAction::Note(label) => {
                state.seen.push(label.to_string());
                Effect::None
            }
            RelayAction::Work { delay } => {
                state.working = true;
                Effect::run(move |send| async move {
                    tokio::time::sleep(delay).await;
                    send.send(RelayAction::WorkDone);
                })
            }
            RelayAction::FanOut => Effect::run_at(Priority::Background, |send| async move {
                send.send(RelayAction::Note("derived-1"));
                send.send(RelayAction::Note("derived-2"));
            }),
            RelayAction::Explode => Effect::run(|_send| async move {
                panic!("effect body failure");
            }),
            RelayAction::WorkDone => {
                state.working = false;
                state.seen.push("done".to_string());
                Effect::None
            }
        }
    }
}

fn relay_core() -> Core<RelayReducer> {
    let core = Core::new(RelayReducer, RelayState::default());
    core.enable_test_mode();
    core
}

// =========================================================================
// Ordering
// =========================================================================

#[tokio::test]
async fn actions_processed_in_submission_order() {
    let core = relay_core();
    for label in ["a", "b", "c", "d", "e"] {
        core.send(RelayAction::Note(label));
    }
    core.exhaust(Duration::from_secs(5)).await.unwrap();

    assert_eq!(core.state().seen, vec!["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn derived_actions_are_ordered_between_themselves() {
    let core = relay_core();
    core.send(RelayAction::FanOut);
    core.exhaust(Duration::from_secs(5)).await.unwrap();

    assert_eq!(core.state().seen, vec!["derived-1", "derived-2"]);
}

// =========================================================================
// Settlement and effect gating
// =========================================================================

#[tokio::test]
async fn none_effect_settles_without_timeout() {
    let core = relay_core();
    core.send(RelayAction::Note("solo"));
    core.exhaust(Duration::from_secs(5)).await.unwrap();

    assert_eq!(core.state().seen, vec!["solo"]);
}

#[tokio::test]
async fn exhaust_waits_for_effect_and_its_derived_action() {
    let core = relay_core();
    core.send(RelayAction::Work {
        delay: Duration::from_millis(100),
    });
    core.exhaust(Duration::from_secs(5)).await.unwrap();

    let state = core.state();
    assert!(!state.working, "derived action must settle before release");
    assert_eq!(state.seen, vec!["done"]);
}

#[tokio::test]
async fn exhaust_times_out_on_slow_effect() {
    let core = relay_core();
    core.send(RelayAction::Work {
        delay: Duration::from_secs(1),
    });
    let result = core.exhaust(Duration::from_millis(10)).await;

    assert_eq!(result, Err(ExhaustTimeout));
    assert!(core.state().working);
}

#[tokio::test]
async fn panicking_effect_still_settles_its_slot() {
    let core = relay_core();
    core.send(RelayAction::Explode);
    core.exhaust(Duration::from_secs(5)).await.unwrap();
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test]
async fn dropping_core_releases_outstanding_waiters() {
    let core = relay_core();
    core.send(RelayAction::Work {
        delay: Duration::from_secs(30),
    });

    let wait = core.exhaust(Duration::from_secs(5));
    let waiter = tokio::spawn(wait);
    tokio::task::yield_now().await;

    drop(core);
    let result = waiter.await.unwrap();
    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn sender_outlives_core_without_panicking() {
    let core = relay_core();
    let sender = core.sender();
    drop(core);

    // No loop left: the send is a quiet no-op.
    sender.send(RelayAction::Note("late"));
}

#[tokio::test]
async fn queued_actions_still_reduce_after_drop() {
    let observed = Arc::new(AtomicBool::new(false));

    struct Observing {
        observed: Arc<AtomicBool>,
    }

    impl Reducer for Observing {
        type Action = ();
        type State = u32;

        fn reduce(&mut self, state: &mut u32, _action: ()) -> Effect<()> {
            *state += 1;
            self.observed.store(true, Ordering::SeqCst);
            Effect::None
        }
    }

    let core = Core::new(
        Observing {
            observed: Arc::clone(&observed),
        },
        0,
    );
    core.send(());
    drop(core);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(observed.load(Ordering::SeqCst), "admitted action must reach reduce");
}

// =========================================================================
// State subscriptions
// =========================================================================

#[tokio::test]
async fn changes_replay_snapshot_then_follow_updates() -> anyhow::Result<()> {
    let core = relay_core();
    let mut changes = core.changes();

    core.send(RelayAction::Note("x"));
    core.send(RelayAction::Note("y"));
    core.exhaust(Duration::from_secs(5)).await?;

    let replayed = changes.recv().await.context("stream ended early")?;
    assert_eq!(replayed.seen, Vec::<String>::new());
    assert_eq!(changes.recv().await.context("missing first update")?.seen, vec!["x"]);
    assert_eq!(
        changes.recv().await.context("missing second update")?.seen,
        vec!["x", "y"]
    );
    Ok(())
}

#[tokio::test]
async fn distinct_projection_suppresses_unchanged_values() {
    let core = relay_core();
    let mut working = core.changes().distinct_by(|s| s.working);

    // Three notes never touch `working`; only the work cycle flips it.
    core.send(RelayAction::Note("a"));
    core.send(RelayAction::Note("b"));
    core.send(RelayAction::Work {
        delay: Duration::from_millis(10),
    });
    core.send(RelayAction::Note("c"));
    core.exhaust(Duration::from_secs(5)).await.unwrap();

    assert_eq!(working.recv().await, Some(false));
    assert_eq!(working.recv().await, Some(true));
    assert_eq!(working.recv().await, Some(false));
}

// =========================================================================
// Lifecycle hooks
// =========================================================================

#[tokio::test]
async fn lifecycle_hooks_fire_once_around_the_consumer() {
    struct Hooked {
        active: Arc<AtomicBool>,
        resigned: Arc<AtomicBool>,
    }

    impl Reducer for Hooked {
        type Action = ();
        type State = ();

        fn reduce(&mut self, _state: &mut (), _action: ()) -> Effect<()> {
            Effect::None
        }

        fn did_become_active(&mut self) {
            self.active.store(true, Ordering::SeqCst);
        }

        fn will_resign_active(&mut self) {
            self.resigned.store(true, Ordering::SeqCst);
        }
    }

    let active = Arc::new(AtomicBool::new(false));
    let resigned = Arc::new(AtomicBool::new(false));
    let core = Core::new(
        Hooked {
            active: Arc::clone(&active),
            resigned: Arc::clone(&resigned),
        },
        (),
    );

    assert!(!active.load(Ordering::SeqCst), "consumer starts lazily");
    core.send(());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(active.load(Ordering::SeqCst));
    assert!(!resigned.load(Ordering::SeqCst));

    drop(core);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(resigned.load(Ordering::SeqCst));
}
