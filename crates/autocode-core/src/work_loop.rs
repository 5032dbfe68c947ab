//! Autonomous work loop for coding projects.
//!
//! Feeds a project's pending steps into its tmux session one at a time. The
//! driven tool reports nothing structured, so each step is judged by scraping
//! the pane until it looks idle, stalls, or times out. Failures are retried on
//! the same step until a retry ceiling marks the project failed.

use crate::{CompletionDetector, ContextStore, Multiplexer, Result};
use autocode_types::{ContextStatus, LogLevel, WorkStep};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Timing and retry limits for the work loop.
#[derive(Debug, Clone)]
pub struct WorkLoopConfig {
    /// Delay after session start before the first step is sent.
    pub warmup: Duration,
    pub poll_interval: Duration,
    /// Upper bound on polling for a single step.
    pub step_timeout: Duration,
    /// Consecutive unchanged captures after which a step counts as stalled.
    pub stall_polls: u32,
    /// Consecutive failed attempts before the project is marked failed.
    pub max_retries: u32,
    pub capture_lines: usize,
}

impl Default for WorkLoopConfig {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(5),
            poll_interval: Duration::from_secs(2),
            step_timeout: Duration::from_secs(300),
            stall_polls: 150,
            max_retries: 3,
            capture_lines: crate::tmux::DEFAULT_CAPTURE_LINES,
        }
    }
}

/// How polling for one step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Idle,
    Stalled,
    TimedOut,
    Cancelled,
}

impl PollOutcome {
    fn describe(&self) -> &'static str {
        match self {
            PollOutcome::Idle => "went idle",
            PollOutcome::Stalled => "stalled",
            PollOutcome::TimedOut => "timed out",
            PollOutcome::Cancelled => "was cancelled",
        }
    }
}

/// How the whole loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// No pending steps remain.
    Completed,
    /// The retry ceiling was reached on one step.
    Failed { step_id: Uuid, attempts: u32 },
    /// The tmux session disappeared underneath the loop.
    SessionLost,
    /// The store or multiplexer failed underneath the loop.
    Aborted(String),
    Cancelled,
}

/// One loop instance bound to one started project.
pub struct WorkLoop {
    context_id: Uuid,
    session: String,
    store: Arc<ContextStore>,
    multiplexer: Arc<dyn Multiplexer>,
    detector: Arc<dyn CompletionDetector>,
    config: WorkLoopConfig,
}

impl WorkLoop {
    pub fn new(
        context_id: Uuid,
        session: String,
        store: Arc<ContextStore>,
        multiplexer: Arc<dyn Multiplexer>,
        detector: Arc<dyn CompletionDetector>,
        config: WorkLoopConfig,
    ) -> Self {
        Self {
            context_id,
            session,
            store,
            multiplexer,
            detector,
            config,
        }
    }

    /// Run until completion, failure, session loss or cancellation, and
    /// persist the resulting status. A cancelled loop writes nothing.
    pub async fn run(self, cancel: CancellationToken) -> LoopOutcome {
        match self.drive(&cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    target: "autocode::work_loop",
                    "Work loop for {} aborted: {}",
                    self.context_id, e
                );
                if !cancel.is_cancelled() {
                    self.record(LogLevel::Error, &format!("Work loop aborted: {}", e));
                    self.persist_status(ContextStatus::Failed);
                }
                LoopOutcome::Aborted(e.to_string())
            }
        }
    }

    async fn drive(&self, cancel: &CancellationToken) -> Result<LoopOutcome> {
        info!(target: "autocode::work_loop", "Starting work loop for {}", self.context_id);

        if !sleep_or_cancel(cancel, self.config.warmup).await {
            return Ok(LoopOutcome::Cancelled);
        }
        self.record(LogLevel::Info, "Work loop started");

        let mut errors: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Ok(LoopOutcome::Cancelled);
            }

            let Some(step) = self.store.next_pending_step(self.context_id)? else {
                info!(target: "autocode::work_loop", "All steps done for {}", self.context_id);
                self.record(LogLevel::Info, "All steps completed");
                self.persist_status(ContextStatus::Completed);
                return Ok(LoopOutcome::Completed);
            };

            if !self.multiplexer.exists(&self.session).await? {
                warn!(
                    target: "autocode::work_loop",
                    "Session {} vanished, pausing {}",
                    self.session, self.context_id
                );
                if cancel.is_cancelled() {
                    return Ok(LoopOutcome::Cancelled);
                }
                self.store.stop_running_instances(self.context_id)?;
                self.record(LogLevel::Warning, "Session vanished, project paused");
                self.persist_status(ContextStatus::Paused);
                return Ok(LoopOutcome::SessionLost);
            }

            self.record(LogLevel::Info, &format!("Sending step {}", step.position));
            let outcome = match self
                .multiplexer
                .send_keys(&self.session, &compose_prompt(&step))
                .await
            {
                Ok(()) => self.monitor(cancel).await?,
                Err(e) => {
                    warn!(target: "autocode::work_loop", "Failed to send step {}: {}", step.position, e);
                    self.record(
                        LogLevel::Warning,
                        &format!("Failed to send step {}: {}", step.position, e),
                    );
                    PollOutcome::TimedOut
                }
            };

            match outcome {
                PollOutcome::Cancelled => return Ok(LoopOutcome::Cancelled),
                PollOutcome::Idle => {
                    if cancel.is_cancelled() {
                        return Ok(LoopOutcome::Cancelled);
                    }
                    self.store.mark_step_done(step.id)?;
                    self.record(LogLevel::Info, &format!("Step {} completed", step.position));
                    errors = 0;
                    info!(
                        target: "autocode::work_loop",
                        "Step {} completed for {}",
                        step.position, self.context_id
                    );
                }
                PollOutcome::Stalled | PollOutcome::TimedOut => {
                    errors += 1;
                    warn!(
                        target: "autocode::work_loop",
                        "Step {} for {} ended {:?} (attempt {}/{})",
                        step.position, self.context_id, outcome, errors, self.config.max_retries
                    );
                    self.record(
                        LogLevel::Warning,
                        &format!(
                            "Step {} {} (attempt {}/{})",
                            step.position,
                            outcome.describe(),
                            errors,
                            self.config.max_retries
                        ),
                    );
                    if errors >= self.config.max_retries {
                        if cancel.is_cancelled() {
                            return Ok(LoopOutcome::Cancelled);
                        }
                        warn!(target: "autocode::work_loop", "Max retries reached for {}", self.context_id);
                        self.record(
                            LogLevel::Error,
                            &format!("Step {} failed after {} attempts", step.position, errors),
                        );
                        self.persist_status(ContextStatus::Failed);
                        return Ok(LoopOutcome::Failed {
                            step_id: step.id,
                            attempts: errors,
                        });
                    }
                }
            }
        }
    }

    /// Poll the pane until it looks idle, stops changing, or the step times out.
    async fn monitor(&self, cancel: &CancellationToken) -> Result<PollOutcome> {
        let mut elapsed = Duration::ZERO;
        let mut last_output = String::new();
        let mut unchanged: u32 = 0;

        while elapsed < self.config.step_timeout {
            if !sleep_or_cancel(cancel, self.config.poll_interval).await {
                return Ok(PollOutcome::Cancelled);
            }
            elapsed += self.config.poll_interval;

            let output = self
                .multiplexer
                .capture_pane(&self.session, self.config.capture_lines)
                .await?;
            if self.detector.is_idle(&output) {
                return Ok(PollOutcome::Idle);
            }
            if output == last_output {
                unchanged += 1;
                if unchanged >= self.config.stall_polls {
                    debug!(target: "autocode::work_loop", "Pane for {} stalled", self.context_id);
                    return Ok(PollOutcome::Stalled);
                }
            } else {
                unchanged = 0;
                last_output = output;
            }
        }
        Ok(PollOutcome::TimedOut)
    }

    /// Append to the project's activity log. Failures are only traced.
    fn record(&self, level: LogLevel, message: &str) {
        if let Err(e) = self.store.append_log(self.context_id, level, message) {
            debug!(
                target: "autocode::work_loop",
                "Failed to log activity for {}: {}",
                self.context_id, e
            );
        }
    }

    fn persist_status(&self, status: ContextStatus) {
        if let Err(e) = self.store.update_status(self.context_id, status) {
            warn!(
                target: "autocode::work_loop",
                "Failed to set {} to {}: {}",
                self.context_id, status, e
            );
        }
    }
}

pub fn compose_prompt(step: &WorkStep) -> String {
    step.prompt.trim().to_string()
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
