//! Axum server assembly

use crate::records::TaskRecords;
use crate::routes;
use crate::state::{AppState, SharedState};
use axum::routing::{get, post};
use axum::Router;
use rover_agent::{CompletionClient, Model};
use rover_core::Result;
use rover_loop::RepairConfig;
use rover_store::ArtifactStore;
use rover_vcs::GitManager;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const PATCHES_DIR: &str = "patches";
const TASKS_FILE: &str = "tasks.json";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address, e.g. `127.0.0.1:8001`
    pub addr: String,
    /// Directory holding the patch store, the task table and the git repo
    pub data_dir: PathBuf,
    /// Completion model for generation and analysis
    pub model: Model,
    /// Repair loop bounds
    pub repair: RepairConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8001".to_string(),
            data_dir: PathBuf::from("rover-data"),
            model: Model::default(),
            repair: RepairConfig::default(),
        }
    }
}

/// Build the application router for the given state
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/tasks", post(routes::create_task).get(routes::list_tasks))
        .route("/tasks/search", get(routes::search_tasks))
        .route(
            "/tasks/:id",
            get(routes::get_task).delete(routes::delete_task),
        )
        .route("/tasks/:id/complete", post(routes::complete_task))
        .route("/tasks/:id/generate", post(routes::generate_for_task))
        .route("/patches", get(routes::list_patches))
        .route(
            "/patches/:id",
            get(routes::get_patch).delete(routes::delete_patch),
        )
        .route("/git/init", post(routes::git_init))
        .route("/git/config", post(routes::git_config))
        .route("/git/remote", post(routes::git_remote))
        .route("/git/commit", post(routes::git_commit))
        .route("/git/push", post(routes::git_push))
        .route("/git/status", get(routes::git_status))
        .route("/git/push-patch/:id", post(routes::git_push_patch))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP service until the process is stopped
pub async fn serve(config: ServerConfig) -> Result<()> {
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let records = TaskRecords::open(config.data_dir.join(TASKS_FILE)).await?;
    let state: SharedState = Arc::new(AppState {
        records,
        store: ArtifactStore::new(config.data_dir.join(PATCHES_DIR)),
        git: GitManager::new(&config.data_dir),
        backend: Arc::new(CompletionClient::new(config.model)),
        repair: config.repair.clone(),
    });

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    tracing::info!("Rover listening on {}", config.addr);
    axum::serve(listener, app).await?;
    Ok(())
}
