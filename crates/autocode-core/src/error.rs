//! Error types for AutoCode.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AutocodeError {
    #[error("Work context not found: {0}")]
    ContextNotFound(Uuid),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("A context with session name '{0}' already exists")]
    ContextAlreadyExists(String),

    #[error("Context {0} is already running")]
    AlreadyRunning(Uuid),

    #[error("Context {0} has no live session")]
    NotRunning(Uuid),

    #[error("Context {0} is still answering the previous message")]
    Busy(Uuid),

    #[error("Cannot {action} a {kind} context")]
    UnsupportedAction { action: &'static str, kind: String },

    #[error("Multiplexer error: {0}")]
    Multiplexer(String),

    #[error("Claude CLI failed (exit {code:?}): {stderr}")]
    DrivenCliFailed { code: Option<i32>, stderr: String },

    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl AutocodeError {
    /// Whether the error is a rejected precondition with no state mutated.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            AutocodeError::AlreadyRunning(_)
                | AutocodeError::NotRunning(_)
                | AutocodeError::Busy(_)
                | AutocodeError::ContextAlreadyExists(_)
                | AutocodeError::UnsupportedAction { .. }
        )
    }
}
