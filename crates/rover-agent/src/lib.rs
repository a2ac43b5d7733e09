//! # rover-agent
//!
//! The completion-model boundary and the two components built on it:
//!
//! - [`CodeGenerator`] - turns a [`rover_core::TaskSpec`] (plus an optional
//!   prior diagnosis) into a [`rover_core::Patch`], persisted through the
//!   artifact store before it is returned
//! - [`Analyzer`] - judges an execution outcome, cheaply when it can
//!   (heuristic pre-checks) and via one completion call when it cannot
//!
//! The model is treated as an unreliable remote dependency: every call can
//! fail closed, parse failures never propagate as crashes, and best-effort
//! partial artifacts are kept rather than discarded.

mod analyzer;
mod auth;
mod breaker;
mod client;
mod generator;
mod parser;
mod prompt;
mod types;

pub use analyzer::{is_benign_stderr, parse_diagnosis, Analyzer, OutcomeAnalyzer};
pub use auth::resolve_api_token;
pub use breaker::Breaker;
pub use client::{CompletionBackend, CompletionClient};
pub use generator::{CodeGenerator, GeneratorConfig, PatchGenerator};
pub use parser::{extract_sources, parse_requirement_lines, ParsedSources};
pub use prompt::{build_analysis_prompt, build_generation_prompt};
pub use types::{Completion, Model, Usage};
