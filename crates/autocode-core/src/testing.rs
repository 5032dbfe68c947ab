//! In-memory fakes for the external tools, for tests that must not touch a
//! real tmux server or Claude CLI.

use crate::{AutocodeError, Multiplexer, PromptRunner, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A call made against [`FakeMultiplexer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxCall {
    Create { name: String, working_dir: PathBuf },
    Kill { name: String },
    SendKeys { name: String, text: String },
}

#[derive(Default)]
struct FakeMuxState {
    sessions: HashSet<String>,
    calls: Vec<MuxCall>,
    /// Remaining pane frames per session. The last frame repeats forever.
    panes: HashMap<String, VecDeque<String>>,
}

/// [`Multiplexer`] that keeps sessions in memory and records every mutation.
#[derive(Default)]
pub struct FakeMultiplexer {
    state: Mutex<FakeMuxState>,
}

impl FakeMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeMuxState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a session as if it had been started outside our control.
    pub fn add_session(&self, name: &str) {
        self.state().sessions.insert(name.to_string());
    }

    /// Make a session disappear without a recorded kill, like a crash.
    pub fn remove_session(&self, name: &str) {
        self.state().sessions.remove(name);
    }

    /// Script the frames returned by successive captures of a session.
    pub fn set_pane(&self, name: &str, frames: &[&str]) {
        self.state().panes.insert(
            name.to_string(),
            frames.iter().map(|f| f.to_string()).collect(),
        );
    }

    pub fn calls(&self) -> Vec<MuxCall> {
        self.state().calls.clone()
    }

    pub fn sent_keys(&self, name: &str) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                MuxCall::SendKeys { name: n, text } if n == name => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn has_session(&self, name: &str) -> bool {
        self.state().sessions.contains(name)
    }
}

#[async_trait]
impl Multiplexer for FakeMultiplexer {
    async fn create(&self, name: &str, working_dir: &Path) -> Result<()> {
        let mut state = self.state();
        if !state.sessions.insert(name.to_string()) {
            return Err(AutocodeError::Multiplexer(format!(
                "duplicate session: {}",
                name
            )));
        }
        state.calls.push(MuxCall::Create {
            name: name.to_string(),
            working_dir: working_dir.to_path_buf(),
        });
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.state().sessions.contains(name))
    }

    async fn kill(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.sessions.remove(name);
        state.calls.push(MuxCall::Kill {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn send_keys(&self, name: &str, text: &str) -> Result<()> {
        let mut state = self.state();
        if !state.sessions.contains(name) {
            return Err(AutocodeError::Multiplexer(format!(
                "can't find session: {}",
                name
            )));
        }
        state.calls.push(MuxCall::SendKeys {
            name: name.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn capture_pane(&self, name: &str, _lines: usize) -> Result<String> {
        let mut state = self.state();
        if !state.sessions.contains(name) {
            return Ok(String::new());
        }
        let Some(frames) = state.panes.get_mut(name) else {
            return Ok(String::new());
        };
        let frame = if frames.len() > 1 {
            frames.pop_front()
        } else {
            frames.front().cloned()
        };
        Ok(frame.unwrap_or_default())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut sessions: Vec<String> = self.state().sessions.iter().cloned().collect();
        sessions.sort();
        Ok(sessions)
    }
}

/// A call made against [`ScriptedRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerCall {
    pub workspace: PathBuf,
    pub message: String,
    pub continuation: bool,
}

#[derive(Default)]
struct RunnerState {
    replies: VecDeque<std::result::Result<String, String>>,
    calls: Vec<RunnerCall>,
}

/// [`PromptRunner`] that answers from a queue of canned replies. Once the
/// queue is empty every message is echoed back.
#[derive(Default)]
pub struct ScriptedRunner {
    state: Mutex<RunnerState>,
    delay: Duration,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every reply for `delay`, so a message can be observed in flight.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_reply(&self, reply: &str) {
        self.state().replies.push_back(Ok(reply.to_string()));
    }

    pub fn push_failure(&self, stderr: &str) {
        self.state().replies.push_back(Err(stderr.to_string()));
    }

    pub fn calls(&self) -> Vec<RunnerCall> {
        self.state().calls.clone()
    }
}

#[async_trait]
impl PromptRunner for ScriptedRunner {
    async fn run(&self, workspace: &Path, message: &str, continuation: bool) -> Result<String> {
        let reply = {
            let mut state = self.state();
            state.calls.push(RunnerCall {
                workspace: workspace.to_path_buf(),
                message: message.to_string(),
                continuation,
            });
            state.replies.pop_front()
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(stderr)) => Err(AutocodeError::DrivenCliFailed {
                code: Some(1),
                stderr,
            }),
            None => Ok(format!("echo: {}", message)),
        }
    }
}
