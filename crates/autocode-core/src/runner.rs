//! Non-interactive invocation of the driven CLI.

use crate::{AutocodeError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs one message through the driven CLI and returns its reply text.
#[async_trait]
pub trait PromptRunner: Send + Sync {
    /// `continuation` asks the tool to continue the workspace's previous
    /// conversation instead of starting a new one.
    async fn run(&self, workspace: &Path, message: &str, continuation: bool) -> Result<String>;
}

/// [`PromptRunner`] for `claude -p ... --output-format json`.
pub struct ClaudeRunner {
    claude_path: PathBuf,
}

impl ClaudeRunner {
    pub fn new(claude_path: PathBuf) -> Self {
        Self { claude_path }
    }
}

/// Final JSON object printed by the CLI in `json` output mode.
#[derive(Debug, Deserialize)]
struct OneShotResult {
    #[serde(default)]
    result: String,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    subtype: Option<String>,
}

pub(crate) fn build_args(message: &str, continuation: bool) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        message.to_string(),
        "--dangerously-skip-permissions".to_string(),
        "--output-format".to_string(),
        "json".to_string(),
    ];
    if continuation {
        args.push("-c".to_string());
    }
    args
}

/// Extract the reply from the CLI's JSON output.
pub(crate) fn parse_output(stdout: &str) -> Result<String> {
    let parsed: OneShotResult = serde_json::from_str(stdout.trim())?;
    if parsed.is_error {
        return Err(AutocodeError::DrivenCliFailed {
            code: None,
            stderr: if parsed.result.is_empty() {
                parsed.subtype.unwrap_or_else(|| "error".to_string())
            } else {
                parsed.result
            },
        });
    }
    Ok(parsed.result)
}

#[async_trait]
impl PromptRunner for ClaudeRunner {
    async fn run(&self, workspace: &Path, message: &str, continuation: bool) -> Result<String> {
        info!(
            target: "autocode::runner",
            "Running one-shot message in {:?} (continuation: {})",
            workspace, continuation
        );
        debug!(target: "autocode::runner", "Message: {}", message);

        let output = Command::new(&self.claude_path)
            .args(build_args(message, continuation))
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AutocodeError::DrivenCliFailed {
                code: None,
                stderr: format!("failed to spawn {}: {}", self.claude_path.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                target: "autocode::runner",
                "Claude CLI exited with {:?}: {}",
                output.status.code(),
                stderr
            );
            return Err(AutocodeError::DrivenCliFailed {
                code: output.status.code(),
                stderr,
            });
        }

        parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_args() {
        let args = build_args("Hello", false);
        assert_eq!(args[0], "-p");
        assert_eq!(args[1], "Hello");
        assert!(args.contains(&"--output-format".to_string()));
        assert!(!args.contains(&"-c".to_string()));
    }

    #[test]
    fn test_continuation_adds_flag() {
        let args = build_args("Continue", true);
        assert_eq!(args.last().map(String::as_str), Some("-c"));
    }

    #[test]
    fn test_parse_result_field() {
        let out = r#"{"type":"result","subtype":"success","result":"Hello from Claude"}"#;
        assert_eq!(parse_output(out).unwrap(), "Hello from Claude");
    }

    #[test]
    fn test_parse_error_event() {
        let out = r#"{"type":"result","subtype":"error_max_turns","is_error":true}"#;
        let err = parse_output(out).unwrap_err();
        assert!(matches!(err, AutocodeError::DrivenCliFailed { stderr, .. } if stderr == "error_max_turns"));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(parse_output("not json"), Err(AutocodeError::JsonError(_))));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let runner = ClaudeRunner::new(PathBuf::from("false"));
        let dir = tempfile::tempdir().unwrap();
        let err = runner.run(dir.path(), "Hello", false).await.unwrap_err();
        assert!(matches!(err, AutocodeError::DrivenCliFailed { code: Some(1), .. }));
    }
}
