//! Work context types and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Kind of work a context hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// Coding project driven by the autonomous work loop.
    Project,
    /// Research session driven by one-shot messages.
    Research,
}

impl ContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::Project => "project",
            ContextKind::Research => "research",
        }
    }

    /// Directory under the user's data dir that holds contexts of this kind.
    pub fn workspace_dir(&self) -> &'static str {
        match self {
            ContextKind::Project => "projects",
            ContextKind::Research => "research",
        }
    }
}

/// Lifecycle status of a work context.
///
/// Projects move through `pending → running ⇄ paused → completed | failed`.
/// Research sessions use `active`, `thinking` and `idle` on top of `paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Active,
    Thinking,
    Idle,
}

impl ContextStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextStatus::Pending => "pending",
            ContextStatus::Running => "running",
            ContextStatus::Paused => "paused",
            ContextStatus::Completed => "completed",
            ContextStatus::Failed => "failed",
            ContextStatus::Active => "active",
            ContextStatus::Thinking => "thinking",
            ContextStatus::Idle => "idle",
        }
    }

    /// Whether this status claims a live multiplexer session.
    ///
    /// `thinking` is left out: its reply comes from a one-shot run that does
    /// not need the session, and the status settles to `idle` once it lands.
    pub fn expects_live_session(&self) -> bool {
        matches!(
            self,
            ContextStatus::Running | ContextStatus::Active | ContextStatus::Idle
        )
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ContextStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {what}: {value}")]
pub struct ParseEnumError {
    pub what: &'static str,
    pub value: String,
}

impl FromStr for ContextKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(ContextKind::Project),
            "research" => Ok(ContextKind::Research),
            _ => Err(ParseEnumError {
                what: "context kind",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for ContextStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => ContextStatus::Pending,
            "running" => ContextStatus::Running,
            "paused" => ContextStatus::Paused,
            "completed" => ContextStatus::Completed,
            "failed" => ContextStatus::Failed,
            "active" => ContextStatus::Active,
            "thinking" => ContextStatus::Thinking,
            "idle" => ContextStatus::Idle,
            _ => {
                return Err(ParseEnumError {
                    what: "context status",
                    value: s.to_string(),
                })
            }
        })
    }
}

/// Editable fields of a context. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
}

impl ContextUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.architecture.is_none()
    }
}

/// A project or research session that may drive an external CLI tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkContext {
    pub id: Uuid,
    pub user_id: Uuid,
    pub agent_id: Uuid,
    pub kind: ContextKind,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub architecture: String,
    /// Absolute path of the context's workspace directory.
    pub workspace_path: PathBuf,
    /// Name of the tmux session. The session itself may or may not exist.
    pub tmux_session: String,
    pub status: ContextStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One ordered unit of autonomous work for a coding project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkStep {
    pub id: Uuid,
    pub context_id: Uuid,
    pub position: u32,
    pub prompt: String,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Status of a single run of a context's driven process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Stopped,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Running => "running",
            InstanceStatus::Stopped => "stopped",
        }
    }
}

/// Record of one start of a driven process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInstance {
    pub id: Uuid,
    pub context_id: Uuid,
    pub agent_id: Uuid,
    pub status: InstanceStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            ContextStatus::Pending,
            ContextStatus::Running,
            ContextStatus::Paused,
            ContextStatus::Completed,
            ContextStatus::Failed,
            ContextStatus::Active,
            ContextStatus::Thinking,
            ContextStatus::Idle,
        ] {
            assert_eq!(status.as_str().parse::<ContextStatus>().unwrap(), status);
        }
        assert!("stopped".parse::<ContextStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ContextStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }

    #[test]
    fn test_live_session_statuses() {
        assert!(ContextStatus::Running.expects_live_session());
        assert!(ContextStatus::Active.expects_live_session());
        assert!(ContextStatus::Idle.expects_live_session());
        assert!(!ContextStatus::Paused.expects_live_session());
        assert!(!ContextStatus::Completed.expects_live_session());
        assert!(!ContextStatus::Thinking.expects_live_session());
    }

    #[test]
    fn test_kind_workspace_dir() {
        assert_eq!(ContextKind::Project.workspace_dir(), "projects");
        assert_eq!(ContextKind::Research.workspace_dir(), "research");
        assert_eq!("research".parse::<ContextKind>().unwrap(), ContextKind::Research);
    }
}
