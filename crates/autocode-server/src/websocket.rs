//! Terminal and activity log streaming over WebSocket.

use crate::state::AppState;
use anyhow::Result;
use autocode_types::LogEntry;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitStream;
use futures::{future, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Stream pane changes of `session` to the socket until either side closes.
/// The client only ever receives; anything it sends other than a close is
/// ignored.
pub async fn handle_terminal(socket: WebSocket, state: Arc<AppState>, session: String) -> Result<()> {
    let (ws_tx, ws_rx) = socket.split();
    info!(target: "autocode::ws", "Terminal subscriber connected to {}", session);

    let sink = ws_tx.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))));
    let manager = state.work_manager.clone();
    let stream_session = session.clone();
    let send_task = tokio::spawn(async move {
        manager.stream_pane(&stream_session, sink).await;
    });

    run_until_closed(send_task, ws_rx).await;
    debug!(target: "autocode::ws", "Terminal subscriber left {}", session);
    Ok(())
}

/// Push activity log entries of `context_id` newer than `after_id` as JSON
/// text frames, oldest first.
pub async fn handle_logs(socket: WebSocket, state: Arc<AppState>, context_id: Uuid, after_id: i64) -> Result<()> {
    let (ws_tx, ws_rx) = socket.split();
    info!(target: "autocode::ws", "Log subscriber connected to {}", context_id);

    let sink = ws_tx.with(|entry: LogEntry| {
        future::ready(
            serde_json::to_string(&entry)
                .map(|json| Message::Text(json.into()))
                .map_err(axum::Error::new),
        )
    });
    let manager = state.work_manager.clone();
    let send_task = tokio::spawn(async move {
        manager.stream_logs(context_id, after_id, sink).await;
    });

    run_until_closed(send_task, ws_rx).await;
    debug!(target: "autocode::ws", "Log subscriber left {}", context_id);
    Ok(())
}

/// Drive `send_task` until it ends or the client closes, then stop the other.
async fn run_until_closed(mut send_task: JoinHandle<()>, mut ws_rx: SplitStream<WebSocket>) {
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Ping(_) => tracing::trace!(target: "autocode::ws", "Ping from subscriber"),
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }
}
