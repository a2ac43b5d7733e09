//! # rover-sandbox
//!
//! Runs a patch's entry file as a child process with captured stdio under a
//! wall-clock timeout. Languages with package-manager support get an
//! isolated dependency environment provisioned inside the patch directory,
//! so concurrent executions of different patches never share or corrupt
//! dependency state.
//!
//! No persistent side effects beyond the patch's own working directory; the
//! interpreter step needs no network, only dependency installation does.

mod env;
mod executor;

pub use env::DependencyEnv;
pub use executor::{PatchExecutor, Sandbox};
