//! Declarative multi-step workflows over asynchronous components.
//!
//! A procedure chains value-producing async steps into one linear pipeline:
//! each step receives the previous step's `(handle, value)` pair, the final
//! step consumes the last emission, and a single completion callback fires
//! exactly once. Started pipelines can be cancelled, which prevents the
//! completion callback from ever firing.

pub mod procedure;

pub use procedure::{Procedure, ProcedureHandle, ProcedureStatus, ProcedureStep};
