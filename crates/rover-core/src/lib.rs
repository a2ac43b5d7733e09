//! # rover-core
//!
//! Core types for Rover, an autonomous code generation service.
//!
//! Rover takes a task description, asks a completion model for source code,
//! runs that code in an isolated per-patch working directory, and feeds the
//! captured output back into the model to repair failures under a bounded
//! retry budget.
//!
//! This crate holds the shared data model:
//!
//! - [`TaskSpec`] - what the caller wants built
//! - [`Patch`] - the generated artifact (source files + dependencies + history)
//! - [`AttemptRecord`] - one execute/analyze cycle's outcome, append-only
//! - [`Diagnosis`] - the analyzer's failure classification and fix guidance
//! - [`ExecutionOutcome`] - what the sandbox observed
//! - [`RoverError`] - the unified error type

mod error;
mod types;

pub use error::{Result, RoverError};
pub use types::*;
