//! Unidirectional state-management runtime.
//!
//! A [`Core`] owns an immutable state snapshot and an ordered action channel
//! with a single consumer: actions enter through `send`, the user-supplied
//! [`Reducer`] mutates the state with exclusive access and may return an
//! [`Effect`] whose async body runs as a detached task and feeds derived
//! actions back into the same loop.
//!
//! Test harnesses opt a core into in-flight tracking with
//! `enable_test_mode()` and then `exhaust(timeout)` to deterministically wait
//! for every admitted action (and any effect it spawned) to settle.

pub mod effect;
pub mod engine;
pub mod error;
pub mod flight;
#[cfg(feature = "leak-probe")]
pub mod leak;
pub mod scope;
pub mod state;

pub use effect::{ActionSender, Effect, Priority};
pub use engine::{Core, Reducer};
pub use error::ExhaustTimeout;
pub use flight::FlightTracker;
pub use scope::Scope;
pub use state::{DistinctChanges, StateCell, StateChanges};
