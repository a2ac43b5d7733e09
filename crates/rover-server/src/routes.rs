//! Request handlers

use crate::records::NewTask;
use crate::state::SharedState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rover_core::RoverError;
use rover_loop::LoopState;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Error envelope for all handlers
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(what: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: what.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<RoverError> for ApiError {
    fn from(e: RoverError) -> Self {
        let status = match &e {
            RoverError::PatchNotFound(_) => StatusCode::NOT_FOUND,
            RoverError::Spec(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RoverError::Completion(_) | RoverError::RateLimit(_) | RoverError::Auth(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

// -------------------- health --------------------

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "rover" }))
}

// -------------------- tasks --------------------

pub async fn create_task(
    State(state): State<SharedState>,
    Json(new): Json<NewTask>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.records.create(new).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_tasks(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.records.list().await)
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
}

pub async fn search_tasks(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    Json(state.records.search(&params.q).await)
}

pub async fn get_task(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .records
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("task {} not found", id)))
}

pub async fn delete_task(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    if state.records.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("task {} not found", id)))
    }
}

pub async fn complete_task(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .records
        .mark_complete(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("task {} not found", id)))
}

// -------------------- generation --------------------

/// Wire form of a finished repair loop
#[derive(Debug, Serialize)]
pub struct GenerationReport {
    pub task_id: u64,
    pub success: bool,
    pub state: String,
    pub attempts: u32,
    pub patch_id: Option<String>,
    pub history: Vec<rover_core::AttemptRecord>,
    /// Raw completion text, present only when generation never parsed
    pub last_completion: Option<String>,
}

pub async fn generate_for_task(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .records
        .get(id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("task {} not found", id)))?;

    let spec = record.to_spec();
    let report = state.repair_loop().run(&spec).await?;

    if let Some(patch) = &report.patch {
        state.records.set_patch(id, &patch.id).await?;
    }

    let state_label = report.state.to_string();
    Ok(Json(GenerationReport {
        task_id: id,
        success: report.succeeded(),
        state: state_label,
        attempts: report.attempts(),
        patch_id: report.patch.as_ref().map(|p| p.id.clone()),
        history: report
            .patch
            .as_ref()
            .map(|p| p.attempts.clone())
            .unwrap_or_default(),
        last_completion: match &report.state {
            LoopState::GenerationFailed { .. } => report.last_completion.clone(),
            _ => None,
        },
    }))
}

// -------------------- patches --------------------

pub async fn list_patches(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.list().await?))
}

pub async fn get_patch(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.load(&id).await?))
}

pub async fn delete_patch(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -------------------- git --------------------

#[derive(Deserialize)]
pub struct GitConfigBody {
    pub name: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct GitRemoteBody {
    pub name: String,
    pub url: String,
}

#[derive(Deserialize)]
pub struct GitCommitBody {
    pub message: String,
    pub files: Vec<String>,
}

#[derive(Deserialize)]
pub struct GitPushBody {
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Deserialize, Default)]
pub struct PushPatchBody {
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

pub async fn git_init(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    state.git.init().await?;
    Ok(Json(json!({ "message": "repository initialized" })))
}

pub async fn git_config(
    State(state): State<SharedState>,
    Json(body): Json<GitConfigBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.git.configure_user(&body.name, &body.email).await?;
    Ok(Json(json!({ "message": "user configured" })))
}

pub async fn git_remote(
    State(state): State<SharedState>,
    Json(body): Json<GitRemoteBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.git.set_remote(&body.name, &body.url).await?;
    Ok(Json(json!({ "message": format!("remote {} set", body.name) })))
}

pub async fn git_commit(
    State(state): State<SharedState>,
    Json(body): Json<GitCommitBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.git.add(&body.files).await?;
    state.git.commit(&body.message).await?;
    Ok(Json(json!({ "message": "changes committed" })))
}

pub async fn git_push(
    State(state): State<SharedState>,
    Json(body): Json<GitPushBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.git.push(&body.remote, &body.branch).await?;
    Ok(Json(json!({
        "message": format!("pushed to {}/{}", body.remote, body.branch)
    })))
}

pub async fn git_status(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let status = state.git.status().await?;
    Ok(Json(json!({ "status": status })))
}

pub async fn git_push_patch(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<PushPatchBody>,
) -> Result<impl IntoResponse, ApiError> {
    // Loading first gives a 404 for unknown ids and the data for the message
    let patch = state.store.load(&id).await?;
    let message = body.commit_message.unwrap_or_else(|| {
        rover_vcs::patch_commit_message(&patch.id, &patch.description, patch.attempts.len())
    });

    state
        .git
        .commit_patch(&state.store.patch_dir(&id), &message)
        .await?;
    state.git.push(&body.remote, &body.branch).await?;

    Ok(Json(json!({
        "message": format!("patch {} pushed to {}/{}", id, body.remote, body.branch),
        "commit_message": message,
    })))
}
