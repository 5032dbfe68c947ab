//! Integration tests for the work context API.
//!
//! The router runs against the in-memory tmux and Claude fakes, so these
//! exercise the full request path without external processes.

use autocode_core::testing::{FakeMultiplexer, MuxCall, ScriptedRunner};
use autocode_core::{
    Backends, ContextStore, PromptGlyphDetector, WorkLoopConfig, WorkManager, WorkManagerConfig,
};
use autocode_server::{config::Config, router, state::AppState};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    app: Router,
    mux: Arc<FakeMultiplexer>,
    runner: Arc<ScriptedRunner>,
    user_id: Uuid,
    agent_id: Uuid,
    _dir: TempDir,
}

fn create_test_app() -> TestApp {
    create_test_app_with_runner(ScriptedRunner::new())
}

fn create_test_app_with_runner(runner: ScriptedRunner) -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = Config {
        port: 0,
        host: "127.0.0.1".to_string(),
        data_dir: dir.path().join("users"),
        db_path: dir.path().join("test.db"),
        ..Config::default()
    };
    let manager_config = WorkManagerConfig {
        work_loop: WorkLoopConfig {
            warmup: Duration::from_secs(3600),
            ..WorkLoopConfig::default()
        },
        ..config.work_manager_config()
    };

    let mux = Arc::new(FakeMultiplexer::new());
    let runner = Arc::new(runner);
    let store = Arc::new(ContextStore::open(&config.db_path).unwrap());
    let manager = WorkManager::with_backends(
        manager_config,
        store,
        Backends {
            multiplexer: mux.clone(),
            detector: Arc::new(PromptGlyphDetector),
            runner: runner.clone(),
        },
    );
    let state = Arc::new(AppState::with_manager(config, manager));

    TestApp {
        app: router(state),
        mux,
        runner,
        user_id: Uuid::new_v4(),
        agent_id: Uuid::new_v4(),
        _dir: dir,
    }
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call_as(self.user_id, method, uri, body).await
    }

    async fn call_as(&self, user_id: Uuid, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", user_id.to_string())
            .header("x-username", "alice");
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_project(&self, name: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                &format!("/api/agents/{}/projects", self.agent_id),
                Some(json!({ "name": name, "description": "Building something cool" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }

    async fn create_research(&self, name: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                &format!("/api/agents/{}/research", self.agent_id),
                Some(json!({ "name": name, "identity": "You read papers." })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }
}

fn id_of(ctx: &Value) -> String {
    ctx["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app();
    let (status, body) = app.call(Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = create_test_app();
    let request = Request::builder()
        .uri(format!("/api/agents/{}/projects", app.agent_id))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_list_projects() {
    let app = create_test_app();
    let ctx = app.create_project("My Awesome Project!").await;
    assert_eq!(ctx["slug"], "my-awesome-project");
    assert_eq!(ctx["status"], "pending");
    assert_eq!(ctx["tmux_session"], "alice-project-my-awesome-project");

    let (status, body) = app
        .call(Method::GET, &format!("/api/agents/{}/projects", app.agent_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["projects"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_errors_map_to_status_codes() {
    let app = create_test_app();
    let uri = format!("/api/agents/{}/projects", app.agent_id);

    let (status, body) = app.call(Method::POST, &uri, Some(json!({ "name": "!!!" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("Invalid name"));

    app.create_project("Demo").await;
    let (status, _) = app.call(Method::POST, &uri, Some(json!({ "name": "demo" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_start_stop_restart_flow() {
    let app = create_test_app();
    let id = id_of(&app.create_project("Demo").await);

    let (status, body) = app.call(Method::POST, &format!("/api/contexts/{}/start", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");

    let (status, body) = app.call(Method::POST, &format!("/api/contexts/{}/start", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["detail"].as_str().unwrap().contains("already running"));

    for _ in 0..2 {
        let (status, body) = app.call(Method::POST, &format!("/api/contexts/{}/stop", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "paused");
    }
    assert!(!app.mux.has_session("alice-project-demo"));

    let (status, body) = app.call(Method::POST, &format!("/api/contexts/{}/restart", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert!(app.mux.has_session("alice-project-demo"));
    let creates = app
        .mux
        .calls()
        .iter()
        .filter(|c| matches!(c, MuxCall::Create { .. }))
        .count();
    assert_eq!(creates, 2);
}

#[tokio::test]
async fn test_steps_are_ordered() {
    let app = create_test_app();
    let id = id_of(&app.create_project("Demo").await);
    let uri = format!("/api/contexts/{}/steps", id);

    let (status, _) = app
        .call(Method::POST, &uri, Some(json!({ "prompts": ["scaffold", "write tests"] })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, body) = app.call(Method::POST, &uri, Some(json!({ "prompts": ["ship it"] }))).await;
    assert_eq!(body["steps"][0]["position"], 2);

    let (status, body) = app.call(Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let prompts: Vec<&str> = body["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["prompt"].as_str().unwrap())
        .collect();
    assert_eq!(prompts, vec!["scaffold", "write tests", "ship it"]);
}

#[tokio::test]
async fn test_other_users_see_not_found() {
    let app = create_test_app();
    let id = id_of(&app.create_project("Demo").await);

    let (status, body) = app
        .call_as(Uuid::new_v4(), Method::GET, &format!("/api/contexts/{}", id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_delete_removes_context() {
    let app = create_test_app();
    let id = id_of(&app.create_project("Demo").await);
    app.call(Method::POST, &format!("/api/contexts/{}/start", id), None).await;

    let (status, _) = app.call(Method::DELETE, &format!("/api/contexts/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!app.mux.has_session("alice-project-demo"));

    let (status, _) = app.call(Method::GET, &format!("/api/contexts/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_research_message_gets_reply() {
    let app = create_test_app();
    app.runner.push_reply("Transformers use attention.");
    let ctx = app.create_research("Paper Notes").await;
    assert_eq!(ctx["status"], "active");
    let id = id_of(&ctx);

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/contexts/{}/message", id),
            Some(json!({ "content": "Summarize attention" })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "thinking");

    let mut messages = Value::Null;
    for _ in 0..100 {
        let (_, body) = app.call(Method::GET, &format!("/api/contexts/{}/messages", id), None).await;
        if body["messages"].as_array().unwrap().len() == 2 {
            messages = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(messages["messages"][0]["role"], "user");
    assert_eq!(messages["messages"][1]["role"], "assistant");
    assert_eq!(messages["messages"][1]["content"], "Transformers use attention.");

    let (_, body) = app.call(Method::GET, &format!("/api/contexts/{}", id), None).await;
    assert_eq!(body["status"], "idle");
}

#[tokio::test]
async fn test_project_message_requires_live_session() {
    let app = create_test_app();
    let id = id_of(&app.create_project("Demo").await);
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/contexts/{}/message", id),
            Some(json!({ "content": "hello" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_resume_is_research_only() {
    let app = create_test_app();
    let id = id_of(&app.create_project("Demo").await);
    let (status, _) = app.call(Method::POST, &format!("/api/contexts/{}/resume", id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_workspace_files() {
    let app = create_test_app();
    let id = id_of(&app.create_research("Paper Notes").await);

    let (status, body) = app.call(Method::GET, &format!("/api/contexts/{}/files", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"][0]["path"], "CLAUDE.md");

    let (status, body) = app
        .call(Method::GET, &format!("/api/contexts/{}/file-content?path=CLAUDE.md", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "You read papers.");

    let (status, _) = app
        .call(Method::GET, &format!("/api/contexts/{}/file-content?path=../../x.md", id), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(Method::GET, &format!("/api/contexts/{}/file-content?path=missing.md", id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_terminal_socket_for_unknown_context_is_not_found() {
    let app = create_test_app();
    let (status, _) = app
        .call(Method::GET, &format!("/ws/contexts/{}/terminal", Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_context_details() {
    let app = create_test_app();
    let id = id_of(&app.create_project("Demo").await);
    let uri = format!("/api/contexts/{}", id);

    let (status, body) = app
        .call(Method::PUT, &uri, Some(json!({ "architecture": "Axum + SQLite" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["architecture"], "Axum + SQLite");
    assert_eq!(body["description"], "Building something cool");

    let (status, _) = app.call(Method::PUT, &uri, Some(json!({ "name": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call_as(Uuid::new_v4(), Method::PUT, &uri, Some(json!({ "description": "x" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_activity_log_follows_transitions() {
    let app = create_test_app();
    let id = id_of(&app.create_project("Demo").await);
    app.call(Method::POST, &format!("/api/contexts/{}/start", id), None).await;
    app.call(Method::POST, &format!("/api/contexts/{}/stop", id), None).await;

    let (status, body) = app.call(Method::GET, &format!("/api/contexts/{}/logs", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["message"], "Started");
    assert_eq!(logs[1]["level"], "info");

    let first = logs[0]["id"].as_i64().unwrap();
    let (_, body) = app
        .call(Method::GET, &format!("/api/contexts/{}/logs?after={}", id, first), None)
        .await;
    assert_eq!(body["logs"].as_array().unwrap().len(), 1);
    assert_eq!(body["logs"][0]["message"], "Stopped");
}

#[tokio::test]
async fn test_research_message_while_thinking_conflicts() {
    let app = create_test_app_with_runner(ScriptedRunner::with_delay(Duration::from_millis(200)));
    let id = id_of(&app.create_research("Paper Notes").await);
    let uri = format!("/api/contexts/{}/message", id);

    let (status, _) = app.call(Method::POST, &uri, Some(json!({ "content": "first" }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, body) = app.call(Method::POST, &uri, Some(json!({ "content": "second" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["detail"].as_str().unwrap().contains("previous message"));

    // Once idle, a live research session cannot be started over.
    for _ in 0..100 {
        let (_, body) = app.call(Method::GET, &format!("/api/contexts/{}", id), None).await;
        if body["status"] == "idle" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let (status, _) = app.call(Method::POST, &format!("/api/contexts/{}/start", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(app.mux.has_session("alice-research-paper-notes"));
}

#[tokio::test]
async fn test_log_socket_for_unknown_context_is_not_found() {
    let app = create_test_app();
    let (status, _) = app
        .call(Method::GET, &format!("/ws/contexts/{}/logs", Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
