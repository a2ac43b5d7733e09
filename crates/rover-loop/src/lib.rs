//! # rover-loop
//!
//! The repair loop: a bounded-retry state machine that treats completion
//! model output as an untrusted, unreliable artifact and decides, after
//! each execution attempt, whether to accept it, retry with corrective
//! context, or give up.
//!
//! Control flow is split in two:
//!
//! - [`transition`] is a pure function over [`LoopState`] and [`LoopEvent`]
//!   with no I/O, so the bounded-retry and audit-trail invariants are
//!   independently testable
//! - [`RepairLoop`] drives it, owning the generator / sandbox / analyzer /
//!   store behind trait seams

mod repair_loop;
mod state_machine;

pub use repair_loop::{RepairConfig, RepairLoop, RepairReport};
pub use state_machine::{transition, LoopAction, LoopEvent, LoopState};
