//! Query attempts and the confirmation gate.
//!
//! This module isolates the per-request pipeline from the transports
//! (HTTP server and CLI) that drive it.

mod attempt;
mod gate;

pub use attempt::{ConfirmationState, ExecutionOutcome, QueryAttempt};
pub use gate::{ConfirmationGate, GateOutcome, GateRequest, GateSettings, SchemaCache};
