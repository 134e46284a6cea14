//! Typed errors for the runtime.
//!
//! Usage violations (calling `exhaust` without test mode, or with nothing in
//! flight) are panics, not error values: they indicate a broken test or
//! integration, never a steady-state condition.

use thiserror::Error;

/// `exhaust` did not observe settlement within its timeout.
///
/// Recoverable: the caller decides whether to fail the test, retry, or
/// report. In-flight work keeps running; a later wait may still settle.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("exhaust timed out before in-flight work settled")]
pub struct ExhaustTimeout;
