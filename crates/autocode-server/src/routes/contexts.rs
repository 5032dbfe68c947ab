//! Routes shared by every kind of work context.

use super::{ApiError, ApiResult, Caller};
use crate::state::AppState;
use autocode_core::{FileContent, WorkspaceFile};
use autocode_types::{ChatMessage, ContextUpdate, LogEntry, WorkContext};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub async fn get(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<WorkContext> {
    Ok(Json(state.work_manager.get_context(caller.user_id(), id).await?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(update): Json<ContextUpdate>,
) -> ApiResult<WorkContext> {
    Ok(Json(
        state
            .work_manager
            .update_context(caller.user_id(), id, update)
            .await?,
    ))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.work_manager.delete_work(caller.user_id(), id).await?;
    info!(target: "autocode::api", "Context {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<WorkContext> {
    Ok(Json(state.work_manager.start_work(caller.user_id(), id).await?))
}

pub async fn stop(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<WorkContext> {
    Ok(Json(state.work_manager.stop_work(caller.user_id(), id).await?))
}

pub async fn restart(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<WorkContext> {
    Ok(Json(state.work_manager.restart_work(caller.user_id(), id).await?))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<WorkContext>), ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Message content is empty"));
    }
    let ctx = state
        .work_manager
        .send_message(caller.user_id(), id, &req.content)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(ctx)))
}

#[derive(Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<ChatMessage>,
}

pub async fn messages(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<MessageListResponse> {
    let messages = state.work_manager.transcript(caller.user_id(), id)?;
    Ok(Json(MessageListResponse { messages }))
}

#[derive(Serialize)]
pub struct FileListResponse {
    pub files: Vec<WorkspaceFile>,
}

pub async fn files(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<FileListResponse> {
    let files = state.work_manager.list_files(caller.user_id(), id)?;
    Ok(Json(FileListResponse { files }))
}

#[derive(Deserialize)]
pub struct FileQuery {
    pub path: String,
}

pub async fn file_content(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Query(query): Query<FileQuery>,
) -> ApiResult<FileContent> {
    Ok(Json(state.work_manager.read_file(caller.user_id(), id, &query.path)?))
}

#[derive(Deserialize)]
pub struct LogQuery {
    /// Only entries with a greater id are returned.
    #[serde(default)]
    pub after: i64,
}

#[derive(Serialize)]
pub struct LogListResponse {
    pub logs: Vec<LogEntry>,
}

pub async fn logs(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> ApiResult<LogListResponse> {
    let logs = state.work_manager.logs(caller.user_id(), id, query.after)?;
    Ok(Json(LogListResponse { logs }))
}
