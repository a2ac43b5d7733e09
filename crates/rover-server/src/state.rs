//! Shared application state

use crate::records::TaskRecords;
use rover_agent::{Analyzer, CodeGenerator, CompletionBackend};
use rover_loop::{RepairConfig, RepairLoop};
use rover_sandbox::Sandbox;
use rover_store::ArtifactStore;
use rover_vcs::GitManager;
use std::sync::Arc;

/// State shared by all request handlers
pub struct AppState {
    pub records: TaskRecords,
    pub store: ArtifactStore,
    pub git: GitManager,
    pub backend: Arc<dyn CompletionBackend>,
    pub repair: RepairConfig,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Assemble a repair loop over this state's store and backend
    ///
    /// Loops are cheap to build; each generation request gets its own so
    /// concurrent requests never share mutable state.
    pub fn repair_loop(&self) -> RepairLoop<CodeGenerator, Sandbox, Analyzer> {
        RepairLoop::new(
            CodeGenerator::new(Arc::clone(&self.backend), self.store.clone()),
            Sandbox::new(),
            Analyzer::new(Arc::clone(&self.backend)),
            self.store.clone(),
        )
        .with_config(self.repair.clone())
    }
}
