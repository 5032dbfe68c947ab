//! Coding project routes.

use super::{ApiError, ApiResult, Caller};
use crate::state::AppState;
use autocode_core::CreateProjectOptions;
use autocode_types::{AgentProfile, ContextKind, WorkContext, WorkStep};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Serialize)]
pub struct ProjectListResponse {
    pub projects: Vec<WorkContext>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(agent_id): Path<Uuid>,
) -> ApiResult<ProjectListResponse> {
    let projects = state
        .work_manager
        .list_contexts(caller.user_id(), agent_id, ContextKind::Project)
        .await?;
    Ok(Json(ProjectListResponse { projects }))
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub architecture: String,
    /// The agent's global rules, resolved by the caller.
    #[serde(default)]
    pub global_rules: String,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Caller(owner): Caller,
    Path(agent_id): Path<Uuid>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<WorkContext>), ApiError> {
    let ctx = state
        .work_manager
        .create_project(
            &owner,
            CreateProjectOptions {
                name: req.name,
                description: req.description,
                architecture: req.architecture,
                agent: AgentProfile {
                    id: agent_id,
                    identity: String::new(),
                    global_rules: req.global_rules,
                },
            },
        )
        .await?;
    info!(target: "autocode::api", "Project {} created by {}", ctx.id, owner.username);
    Ok((StatusCode::CREATED, Json(ctx)))
}

#[derive(Serialize)]
pub struct StepListResponse {
    pub steps: Vec<WorkStep>,
}

pub async fn list_steps(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<StepListResponse> {
    let steps = state.work_manager.list_steps(caller.user_id(), id)?;
    Ok(Json(StepListResponse { steps }))
}

#[derive(Deserialize)]
pub struct AddStepsRequest {
    pub prompts: Vec<String>,
}

pub async fn add_steps(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<AddStepsRequest>,
) -> Result<(StatusCode, Json<StepListResponse>), ApiError> {
    let steps = state
        .work_manager
        .add_steps(caller.user_id(), id, &req.prompts)?;
    Ok((StatusCode::CREATED, Json(StepListResponse { steps })))
}
