//! Research session routes.

use super::{ApiError, ApiResult, Caller};
use crate::state::AppState;
use autocode_core::CreateResearchOptions;
use autocode_types::{AgentProfile, ContextKind, WorkContext};
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
pub struct ResearchListResponse {
    pub sessions: Vec<WorkContext>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(agent_id): Path<Uuid>,
) -> ApiResult<ResearchListResponse> {
    let sessions = state
        .work_manager
        .list_contexts(caller.user_id(), agent_id, ContextKind::Research)
        .await?;
    Ok(Json(ResearchListResponse { sessions }))
}

#[derive(Deserialize)]
pub struct CreateResearchRequest {
    pub name: String,
    /// Persona written to the workspace's CLAUDE.md.
    #[serde(default)]
    pub identity: String,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Caller(owner): Caller,
    Path(agent_id): Path<Uuid>,
    Json(req): Json<CreateResearchRequest>,
) -> Result<(StatusCode, Json<WorkContext>), ApiError> {
    let ctx = state
        .work_manager
        .create_research(
            &owner,
            CreateResearchOptions {
                name: req.name,
                agent: AgentProfile {
                    id: agent_id,
                    identity: req.identity,
                    global_rules: String::new(),
                },
            },
        )
        .await?;
    info!(target: "autocode::api", "Research session {} created by {}", ctx.id, owner.username);
    Ok((StatusCode::CREATED, Json(ctx)))
}

pub async fn resume(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<WorkContext> {
    Ok(Json(state.work_manager.resume_work(caller.user_id(), id).await?))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<WorkContext> {
    Ok(Json(state.work_manager.cancel_message(caller.user_id(), id).await?))
}
