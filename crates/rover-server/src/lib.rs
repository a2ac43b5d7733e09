//! # rover-server
//!
//! The request-routing layer around the repair loop:
//!
//! - task records (create / list / search / complete / delete), persisted
//!   to a JSON file under the data directory
//! - `POST /tasks/{id}/generate` runs the full generate-execute-analyze
//!   repair loop for a task and returns the structured report
//! - patch listing / inspection / deletion backed by the artifact store
//! - git endpoints for publishing finished patches

mod records;
mod routes;
mod server;
mod state;

pub use records::{NewTask, TaskRecord, TaskRecords};
pub use server::{router, serve, ServerConfig};
pub use state::{AppState, SharedState};
