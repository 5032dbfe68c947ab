//! WebSocket route handlers.

use super::{ApiError, Caller};
use crate::state::AppState;
use crate::websocket::{handle_logs, handle_terminal};
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Resolve the context before upgrading, so unknown ids get a plain 404.
pub async fn upgrade(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let session = match state.work_manager.stream_target(caller.user_id(), id) {
        Ok(session) => session,
        Err(e) => return ApiError::from(e).into_response(),
    };
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_connection(socket, state, id, session)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>, id: Uuid, session: String) {
    if let Err(e) = handle_terminal(socket, state, session).await {
        tracing::error!(target: "autocode::ws", "Terminal stream for {} failed: {}", id, e);
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LogStreamQuery {
    /// Resume after this entry id; 0 replays the whole log.
    #[serde(default)]
    pub after: i64,
}

pub async fn upgrade_logs(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Query(query): Query<LogStreamQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Err(e) = state.work_manager.stream_target(caller.user_id(), id) {
        return ApiError::from(e).into_response();
    }
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| async move {
            if let Err(e) = handle_logs(socket, state, id, query.after).await {
                tracing::error!(target: "autocode::ws", "Log stream for {} failed: {}", id, e);
            }
        }),
        Err(rejection) => rejection.into_response(),
    }
}
