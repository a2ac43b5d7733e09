//! # rover-store
//!
//! On-disk artifact store: one directory per generated patch, holding the
//! source subtree, the dependency manifest, and a metadata record with the
//! full attempt history. Save-then-load round-trips a patch exactly.

mod store;

pub use store::{ArtifactStore, PatchSummary};
