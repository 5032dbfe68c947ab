//! Terminal multiplexer access.
//!
//! The multiplexer is an external mutable resource: sessions can die at any
//! time without us noticing. Nothing here caches liveness; every call goes to
//! the backend, and every operation is idempotent or side-effect free when the
//! session is absent.

use crate::{AutocodeError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default number of scrollback lines returned by a pane capture.
pub const DEFAULT_CAPTURE_LINES: usize = 200;

/// Named, detached terminal sessions hosting long-running CLI processes.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Start a detached session rooted at `working_dir`. Fails if the name
    /// is already taken or the backend is unavailable.
    async fn create(&self, name: &str, working_dir: &Path) -> Result<()>;

    /// Whether a session with exactly this name exists.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Kill the session. Succeeds if it does not exist.
    async fn kill(&self, name: &str) -> Result<()>;

    /// Type `text` literally into the session, then press Enter.
    async fn send_keys(&self, name: &str, text: &str) -> Result<()>;

    /// Last `lines` lines of the rendered pane. Empty if the session is gone.
    async fn capture_pane(&self, name: &str, lines: usize) -> Result<String>;

    async fn list_sessions(&self) -> Result<Vec<String>>;
}

/// [`Multiplexer`] backed by the `tmux` binary.
pub struct TmuxMultiplexer {
    tmux_path: PathBuf,
}

impl Default for TmuxMultiplexer {
    fn default() -> Self {
        Self::new(PathBuf::from("tmux"))
    }
}

impl TmuxMultiplexer {
    pub fn new(tmux_path: PathBuf) -> Self {
        Self { tmux_path }
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(target: "autocode::tmux", "tmux {}", args.join(" "));
        Command::new(&self.tmux_path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                AutocodeError::Multiplexer(format!(
                    "failed to run {}: {}",
                    self.tmux_path.display(),
                    e
                ))
            })
    }
}

/// Exact-match session target, so `foo` never resolves to `foo-bar`.
fn session_target(name: &str) -> String {
    format!("={}", name)
}

/// Exact-match pane target for the session's active pane.
fn pane_target(name: &str) -> String {
    format!("={}:", name)
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[async_trait]
impl Multiplexer for TmuxMultiplexer {
    async fn create(&self, name: &str, working_dir: &Path) -> Result<()> {
        let dir = working_dir.to_string_lossy();
        let output = self
            .run(&["new-session", "-d", "-s", name, "-c", &dir])
            .await?;
        if !output.status.success() {
            return Err(AutocodeError::Multiplexer(format!(
                "new-session {} failed: {}",
                name,
                stderr_of(&output)
            )));
        }
        info!(target: "autocode::tmux", session = %name, "Created tmux session in {}", dir);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let output = self.run(&["has-session", "-t", &session_target(name)]).await?;
        Ok(output.status.success())
    }

    async fn kill(&self, name: &str) -> Result<()> {
        let output = self.run(&["kill-session", "-t", &session_target(name)]).await?;
        if output.status.success() {
            info!(target: "autocode::tmux", session = %name, "Killed tmux session");
        } else {
            debug!(
                target: "autocode::tmux",
                session = %name,
                "kill-session had nothing to kill: {}",
                stderr_of(&output)
            );
        }
        Ok(())
    }

    async fn send_keys(&self, name: &str, text: &str) -> Result<()> {
        let target = pane_target(name);
        let output = self.run(&["send-keys", "-t", &target, "-l", text]).await?;
        if !output.status.success() {
            return Err(AutocodeError::Multiplexer(format!(
                "send-keys to {} failed: {}",
                name,
                stderr_of(&output)
            )));
        }
        let output = self.run(&["send-keys", "-t", &target, "Enter"]).await?;
        if !output.status.success() {
            return Err(AutocodeError::Multiplexer(format!(
                "send-keys Enter to {} failed: {}",
                name,
                stderr_of(&output)
            )));
        }
        Ok(())
    }

    async fn capture_pane(&self, name: &str, lines: usize) -> Result<String> {
        let start = format!("-{}", lines);
        let output = self
            .run(&["capture-pane", "-p", "-t", &pane_target(name), "-S", &start])
            .await?;
        if !output.status.success() {
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let output = self.run(&["list-sessions", "-F", "#{session_name}"]).await?;
        if !output.status.success() {
            // No server running means no sessions.
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

/// Kill a session, logging instead of failing. Used on teardown paths where
/// the state transition must go through regardless.
pub async fn kill_best_effort(mux: &dyn Multiplexer, name: &str) {
    if name.is_empty() {
        return;
    }
    if let Err(e) = mux.kill(name).await {
        warn!(target: "autocode::tmux", session = %name, "Failed to kill session: {}", e);
    }
}
