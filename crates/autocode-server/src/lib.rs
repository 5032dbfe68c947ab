//! AutoCode server library: HTTP routes, the terminal and activity log
//! WebSockets and application state, kept apart from main.rs for
//! integration testing.

pub mod config;
pub mod logging;
pub mod routes;
pub mod state;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use state::AppState;
use std::sync::Arc;

/// All `/api` and `/ws` routes, without middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route(
            "/agents/{agent_id}/projects",
            get(routes::projects::list).post(routes::projects::create),
        )
        .route(
            "/agents/{agent_id}/research",
            get(routes::research::list).post(routes::research::create),
        )
        .route(
            "/contexts/{id}",
            get(routes::contexts::get)
                .put(routes::contexts::update)
                .delete(routes::contexts::delete),
        )
        .route("/contexts/{id}/start", post(routes::contexts::start))
        .route("/contexts/{id}/stop", post(routes::contexts::stop))
        .route("/contexts/{id}/restart", post(routes::contexts::restart))
        .route("/contexts/{id}/resume", post(routes::research::resume))
        .route("/contexts/{id}/message", post(routes::contexts::send_message))
        .route("/contexts/{id}/cancel", post(routes::research::cancel))
        .route("/contexts/{id}/messages", get(routes::contexts::messages))
        .route(
            "/contexts/{id}/steps",
            get(routes::projects::list_steps).post(routes::projects::add_steps),
        )
        .route("/contexts/{id}/logs", get(routes::contexts::logs))
        .route("/contexts/{id}/files", get(routes::contexts::files))
        .route("/contexts/{id}/file-content", get(routes::contexts::file_content))
        .route("/health", get(routes::health));

    let ws_routes = Router::new()
        .route("/contexts/{id}/terminal", get(routes::ws::upgrade))
        .route("/contexts/{id}/logs", get(routes::ws::upgrade_logs));

    Router::new()
        .nest("/api", api_routes)
        .nest("/ws", ws_routes)
        .with_state(state)
}
