//! # rover-vcs
//!
//! Version-control integration: stage, commit and push a terminal patch's
//! working directory. Thin async wrappers over the `git` CLI; failures
//! carry git's stderr.

mod git;

pub use git::{patch_commit_message, GitManager, GitOutput};
