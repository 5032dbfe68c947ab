//! HTTP route handlers.

pub mod contexts;
pub mod projects;
pub mod research;
pub mod ws;

use autocode_core::AutocodeError;
use autocode_types::Owner;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Error response rendered as `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<AutocodeError> for ApiError {
    fn from(err: AutocodeError) -> Self {
        let status = match &err {
            AutocodeError::ContextNotFound(_) | AutocodeError::FileNotFound(_) => StatusCode::NOT_FOUND,
            AutocodeError::InvalidName(_)
            | AutocodeError::InvalidPath(_)
            | AutocodeError::UnsupportedAction { .. } => StatusCode::BAD_REQUEST,
            AutocodeError::AlreadyRunning(_)
            | AutocodeError::NotRunning(_)
            | AutocodeError::Busy(_)
            | AutocodeError::ContextAlreadyExists(_) => StatusCode::CONFLICT,
            AutocodeError::Multiplexer(_)
            | AutocodeError::DrivenCliFailed { .. }
            | AutocodeError::ParseError(_)
            | AutocodeError::DatabaseError(_)
            | AutocodeError::IoError(_)
            | AutocodeError::JsonError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(target: "autocode::api", "Request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: &self.detail })).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Caller identity forwarded by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USERNAME_HEADER: &str = "x-username";

/// The authenticated caller, read from gateway headers.
#[derive(Debug, Clone)]
pub struct Caller(pub Owner);

impl Caller {
    pub fn user_id(&self) -> Uuid {
        self.0.user_id
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Not authenticated"))?;
        let username = header(USERNAME_HEADER)
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Not authenticated"))?;
        // The username becomes a path component and part of tmux session names.
        if username.starts_with('.')
            || !username
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid username"));
        }

        Ok(Caller(Owner {
            user_id,
            username: username.to_string(),
        }))
    }
}
