//! Work context lifecycle orchestrating tmux, the store and background tasks.
//!
//! Persisted status is a cache of what the multiplexer is actually doing.
//! Every transition mutates the real session first and records the outcome
//! afterwards; reads reconcile the cache against tmux before returning.

use crate::work_loop::{WorkLoop, WorkLoopConfig};
use crate::{
    AutocodeError, ClaudeRunner, CompletionDetector, ContextStore, FileContent, Multiplexer,
    PromptGlyphDetector, PromptRunner, Result, TaskKind, TaskSupervisor, TmuxMultiplexer,
    WorkspaceFile, bridge, slug, tmux, workspace,
};
use autocode_types::{
    AgentProfile, ChatMessage, ContextKind, ContextStatus, ContextUpdate, InstanceStatus,
    LogEntry, LogLevel, Owner, Role, WorkContext, WorkStep,
};
use chrono::Utc;
use futures::Sink;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Configuration for the work manager.
#[derive(Debug, Clone)]
pub struct WorkManagerConfig {
    /// Root of all per-user workspaces.
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub claude_path: PathBuf,
    /// Keystrokes that launch the driven CLI in a fresh session.
    pub launch_command: String,
    /// Keystrokes that relaunch it continuing the previous conversation.
    pub resume_command: String,
    pub capture_lines: usize,
    pub stream_interval: Duration,
    /// Poll interval of activity log subscribers.
    pub log_interval: Duration,
    pub work_loop: WorkLoopConfig,
}

impl Default for WorkManagerConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir().unwrap_or_default().join("autocode");
        Self {
            data_dir: base.join("users"),
            db_path: base.join("autocode.db"),
            claude_path: PathBuf::from("claude"),
            launch_command: "claude".to_string(),
            resume_command: "claude --continue".to_string(),
            capture_lines: tmux::DEFAULT_CAPTURE_LINES,
            stream_interval: Duration::from_millis(500),
            log_interval: Duration::from_secs(1),
            work_loop: WorkLoopConfig::default(),
        }
    }
}

/// External tools the manager drives.
#[derive(Clone)]
pub struct Backends {
    pub multiplexer: Arc<dyn Multiplexer>,
    pub detector: Arc<dyn CompletionDetector>,
    pub runner: Arc<dyn PromptRunner>,
}

impl Backends {
    /// Real tmux, the glyph heuristic and the Claude CLI.
    pub fn system(claude_path: PathBuf) -> Self {
        Self {
            multiplexer: Arc::new(TmuxMultiplexer::default()),
            detector: Arc::new(PromptGlyphDetector),
            runner: Arc::new(ClaudeRunner::new(claude_path)),
        }
    }
}

/// Options for creating a coding project.
#[derive(Debug, Clone)]
pub struct CreateProjectOptions {
    pub name: String,
    pub description: String,
    pub architecture: String,
    pub agent: AgentProfile,
}

/// Options for creating a research session.
#[derive(Debug, Clone)]
pub struct CreateResearchOptions {
    pub name: String,
    pub agent: AgentProfile,
}

/// Owns the store, the external backends and the task supervisor.
pub struct WorkManager {
    config: WorkManagerConfig,
    store: Arc<ContextStore>,
    multiplexer: Arc<dyn Multiplexer>,
    detector: Arc<dyn CompletionDetector>,
    runner: Arc<dyn PromptRunner>,
    supervisor: TaskSupervisor,
}

impl WorkManager {
    /// Open the database at `config.db_path` and drive the real tools.
    pub fn new(config: WorkManagerConfig) -> Result<Self> {
        let store = Arc::new(ContextStore::open(&config.db_path)?);
        let backends = Backends::system(config.claude_path.clone());
        Ok(Self::with_backends(config, store, backends))
    }

    pub fn with_backends(config: WorkManagerConfig, store: Arc<ContextStore>, backends: Backends) -> Self {
        Self {
            config,
            store,
            multiplexer: backends.multiplexer,
            detector: backends.detector,
            runner: backends.runner,
            supervisor: TaskSupervisor::new(),
        }
    }

    pub fn config(&self) -> &WorkManagerConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    // ---------------------------------------------------------------------
    // Creation
    // ---------------------------------------------------------------------

    /// Create a project: allocate and provision its workspace, but leave tmux
    /// alone until it is started.
    pub async fn create_project(&self, owner: &Owner, opts: CreateProjectOptions) -> Result<WorkContext> {
        let ctx = self.new_context(owner, ContextKind::Project, &opts.name, &opts.agent)?;
        workspace::provision_project(
            &ctx.workspace_path,
            &opts.name,
            &opts.description,
            &opts.architecture,
            &opts.agent,
        )?;

        let ctx = WorkContext {
            description: opts.description,
            architecture: opts.architecture,
            ..ctx
        };
        self.store.insert_context(&ctx)?;
        info!(
            target: "autocode::lifecycle",
            "Created project {} ({}) for {}",
            ctx.id, ctx.slug, owner.username
        );
        Ok(ctx)
    }

    /// Create a research session and launch its driven process immediately.
    /// A failed launch leaves the session paused rather than failing the create.
    pub async fn create_research(&self, owner: &Owner, opts: CreateResearchOptions) -> Result<WorkContext> {
        let ctx = self.new_context(owner, ContextKind::Research, &opts.name, &opts.agent)?;
        workspace::provision_research(&ctx.workspace_path, &opts.agent)?;
        self.store.insert_context(&ctx)?;
        info!(
            target: "autocode::lifecycle",
            "Created research session {} ({}) for {}",
            ctx.id, ctx.slug, owner.username
        );

        match self.launch(&ctx, &self.config.launch_command).await {
            Ok(()) => self.store.update_status(ctx.id, ContextStatus::Active)?,
            Err(e) => {
                warn!(
                    target: "autocode::lifecycle",
                    "Failed to launch research session {}: {}",
                    ctx.id, e
                );
                self.activity(ctx.id, LogLevel::Error, &format!("Launch failed: {}", e));
                self.store.update_status(ctx.id, ContextStatus::Paused)?;
            }
        }
        self.reload(ctx.id)
    }

    fn new_context(
        &self,
        owner: &Owner,
        kind: ContextKind,
        name: &str,
        agent: &AgentProfile,
    ) -> Result<WorkContext> {
        let slug = slug::require_slug(name)?;
        let session = slug::session_name(&owner.username, kind, &slug);
        if self.store.find_by_session(&session)?.is_some() {
            return Err(AutocodeError::ContextAlreadyExists(session));
        }

        let now = Utc::now();
        Ok(WorkContext {
            id: Uuid::new_v4(),
            user_id: owner.user_id,
            agent_id: agent.id,
            kind,
            name: name.trim().to_string(),
            workspace_path: workspace::workspace_path(&self.config.data_dir, &owner.username, kind, &slug),
            slug,
            description: String::new(),
            architecture: String::new(),
            tmux_session: session,
            status: ContextStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Fetch a context owned by `user_id`, reconciled against tmux.
    pub async fn get_context(&self, user_id: Uuid, id: Uuid) -> Result<WorkContext> {
        let ctx = self.load_owned(user_id, id)?;
        self.reconcile(ctx).await
    }

    /// Contexts of one kind for a user's agent, reconciled against tmux.
    pub async fn list_contexts(&self, user_id: Uuid, agent_id: Uuid, kind: ContextKind) -> Result<Vec<WorkContext>> {
        let contexts = self.store.list_contexts(user_id, agent_id, kind)?;
        let mut reconciled = Vec::with_capacity(contexts.len());
        for ctx in contexts {
            reconciled.push(self.reconcile(ctx).await?);
        }
        Ok(reconciled)
    }

    pub fn transcript(&self, user_id: Uuid, id: Uuid) -> Result<Vec<ChatMessage>> {
        let ctx = self.load_owned(user_id, id)?;
        self.store.list_messages(ctx.kind, ctx.id)
    }

    pub fn list_steps(&self, user_id: Uuid, id: Uuid) -> Result<Vec<WorkStep>> {
        let ctx = self.load_owned(user_id, id)?;
        self.store.list_steps(ctx.id)
    }

    pub fn list_files(&self, user_id: Uuid, id: Uuid) -> Result<Vec<WorkspaceFile>> {
        let ctx = self.load_owned(user_id, id)?;
        workspace::list_markdown(&ctx.workspace_path)
    }

    pub fn read_file(&self, user_id: Uuid, id: Uuid, relative: &str) -> Result<FileContent> {
        let ctx = self.load_owned(user_id, id)?;
        workspace::read_file(&ctx.workspace_path, relative)
    }

    /// Activity log entries newer than `after_id`.
    pub fn logs(&self, user_id: Uuid, id: Uuid, after_id: i64) -> Result<Vec<LogEntry>> {
        let ctx = self.load_owned(user_id, id)?;
        self.store.logs_after(ctx.id, after_id, 1000)
    }

    /// Edit the display name, description or architecture. The slug, session
    /// name and workspace stay as they were created.
    pub async fn update_context(&self, user_id: Uuid, id: Uuid, mut update: ContextUpdate) -> Result<WorkContext> {
        let ctx = self.load_owned(user_id, id)?;
        if let Some(name) = update.name.take() {
            let name = name.trim();
            if name.is_empty() {
                return Err(AutocodeError::InvalidName(name.to_string()));
            }
            update.name = Some(name.to_string());
        }
        if !update.is_empty() {
            self.store.update_details(id, &update)?;
            self.activity(id, LogLevel::Info, "Details updated");
            debug!(target: "autocode::lifecycle", "Updated details of {} {}", ctx.kind, id);
        }
        let ctx = self.reload(id)?;
        self.reconcile(ctx).await
    }

    // ---------------------------------------------------------------------
    // Transitions
    // ---------------------------------------------------------------------

    /// Launch the driven process. Projects also get a work loop.
    ///
    /// The stored status is reconciled first, so a context whose session is
    /// really alive (including a research session that has gone `idle`) is
    /// rejected, while one whose session died is relaunched.
    pub async fn start_work(&self, user_id: Uuid, id: Uuid) -> Result<WorkContext> {
        let ctx = self.load_owned(user_id, id)?;
        let ctx = self.reconcile(ctx).await?;
        if ctx.status.expects_live_session() || ctx.status == ContextStatus::Thinking {
            return Err(AutocodeError::AlreadyRunning(id));
        }
        let live = live_status(ctx.kind);

        // A paused context can still have a session left behind.
        if self.multiplexer.exists(&ctx.tmux_session).await? {
            debug!(target: "autocode::lifecycle", "Replacing stale session {}", ctx.tmux_session);
            tmux::kill_best_effort(self.multiplexer.as_ref(), &ctx.tmux_session).await;
        }
        self.store.stop_running_instances(id)?;

        self.launch(&ctx, &self.config.launch_command).await?;
        self.store.update_status(id, live)?;
        if ctx.kind == ContextKind::Project {
            self.spawn_work_loop(&ctx);
        }
        self.activity(id, LogLevel::Info, "Started");
        info!(target: "autocode::lifecycle", "Started {} {}", ctx.kind, id);
        self.reload(id)
    }

    /// Tear the driven process down and mark the context paused.
    pub async fn stop_work(&self, user_id: Uuid, id: Uuid) -> Result<WorkContext> {
        let ctx = self.load_owned(user_id, id)?;
        self.halt(&ctx, false).await?;
        self.reload(id)
    }

    /// Stop then start, as one operation.
    pub async fn restart_work(&self, user_id: Uuid, id: Uuid) -> Result<WorkContext> {
        let ctx = self.load_owned(user_id, id)?;
        self.halt(&ctx, true).await?;
        self.launch(&ctx, &self.config.launch_command).await?;
        self.store.update_status(id, live_status(ctx.kind))?;
        if ctx.kind == ContextKind::Project {
            self.spawn_work_loop(&ctx);
        }
        self.activity(id, LogLevel::Info, "Restarted");
        info!(target: "autocode::lifecycle", "Restarted {} {}", ctx.kind, id);
        self.reload(id)
    }

    /// Reattach a research session, relaunching with conversation
    /// continuation if its tmux session is gone.
    pub async fn resume_work(&self, user_id: Uuid, id: Uuid) -> Result<WorkContext> {
        let ctx = self.load_owned(user_id, id)?;
        if ctx.kind != ContextKind::Research {
            return Err(AutocodeError::UnsupportedAction {
                action: "resume",
                kind: ctx.kind.to_string(),
            });
        }

        if !self.multiplexer.exists(&ctx.tmux_session).await? {
            self.store.stop_running_instances(id)?;
            self.launch(&ctx, &self.config.resume_command).await?;
            self.activity(id, LogLevel::Info, "Resumed with conversation continuation");
            info!(target: "autocode::lifecycle", "Resumed research session {}", id);
        }
        self.store.update_status(id, ContextStatus::Active)?;
        self.reload(id)
    }

    /// Remove a context and everything it owns. Safe when its session is
    /// already gone.
    pub async fn delete_work(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        let ctx = self.load_owned(user_id, id)?;
        self.supervisor.cancel(id);
        tmux::kill_best_effort(self.multiplexer.as_ref(), &ctx.tmux_session).await;
        workspace::remove(&ctx.workspace_path)?;
        self.store.delete_context(id)?;
        info!(target: "autocode::lifecycle", "Deleted {} {}", ctx.kind, id);
        Ok(())
    }

    /// Deliver a user message. Projects type it into their live session;
    /// research sessions answer it with a one-shot run in the background.
    pub async fn send_message(&self, user_id: Uuid, id: Uuid, text: &str) -> Result<WorkContext> {
        let ctx = self.load_owned(user_id, id)?;
        match ctx.kind {
            ContextKind::Project => {
                if !self.multiplexer.exists(&ctx.tmux_session).await? {
                    return Err(AutocodeError::NotRunning(id));
                }
                self.store
                    .append_message(user_id, ctx.kind, id, Role::User, text)?;
                self.multiplexer.send_keys(&ctx.tmux_session, text).await?;
            }
            ContextKind::Research => {
                // One reply in flight per session; a second message would
                // otherwise replace the first task and lose its reply.
                let continuation = self.store.count_messages(ctx.kind, id)? > 0;
                if !self.store.enter_status(id, ContextStatus::Thinking)? {
                    return Err(AutocodeError::Busy(id));
                }
                self.store
                    .append_message(user_id, ctx.kind, id, Role::User, text)?;
                self.spawn_one_shot(&ctx, text.to_string(), continuation);
            }
        }
        self.reload(id)
    }

    /// Abandon an in-flight research message.
    pub async fn cancel_message(&self, user_id: Uuid, id: Uuid) -> Result<WorkContext> {
        let ctx = self.load_owned(user_id, id)?;
        if ctx.kind != ContextKind::Research {
            return Err(AutocodeError::UnsupportedAction {
                action: "cancel",
                kind: ctx.kind.to_string(),
            });
        }
        self.store
            .set_status_if(id, ContextStatus::Thinking, ContextStatus::Idle)?;
        if self.supervisor.cancel(id) {
            info!(target: "autocode::lifecycle", "Cancelled message for {}", id);
        }
        self.reload(id)
    }

    /// Queue work steps on a project. Blank prompts are skipped.
    pub fn add_steps(&self, user_id: Uuid, id: Uuid, prompts: &[String]) -> Result<Vec<WorkStep>> {
        let ctx = self.load_owned(user_id, id)?;
        if ctx.kind != ContextKind::Project {
            return Err(AutocodeError::UnsupportedAction {
                action: "add steps to",
                kind: ctx.kind.to_string(),
            });
        }
        let prompts: Vec<String> = prompts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        self.store.append_steps(id, &prompts)
    }

    // ---------------------------------------------------------------------
    // Streaming
    // ---------------------------------------------------------------------

    /// Session name to stream for a context owned by `user_id`.
    pub fn stream_target(&self, user_id: Uuid, id: Uuid) -> Result<String> {
        Ok(self.load_owned(user_id, id)?.tmux_session)
    }

    /// Pump pane changes of `session` into `sink` until the sink fails.
    pub async fn stream_pane<S>(&self, session: &str, sink: S)
    where
        S: Sink<String> + Unpin,
    {
        bridge::pump_pane(
            self.multiplexer.as_ref(),
            session,
            self.config.stream_interval,
            self.config.capture_lines,
            sink,
        )
        .await;
    }

    /// Pump activity log entries of `id` newer than `after_id` into `sink`
    /// until the sink fails.
    pub async fn stream_logs<S>(&self, id: Uuid, after_id: i64, sink: S)
    where
        S: Sink<LogEntry> + Unpin,
    {
        bridge::pump_logs(&self.store, id, after_id, self.config.log_interval, sink).await;
    }

    // ---------------------------------------------------------------------
    // Startup and shutdown
    // ---------------------------------------------------------------------

    /// Reconcile every context that claims a live session. Projects whose
    /// session survived a restart get their work loop back.
    pub async fn reconcile_orphans(&self) -> Result<usize> {
        let claimed = self.store.list_by_status(&[
            ContextStatus::Running,
            ContextStatus::Active,
            ContextStatus::Idle,
            ContextStatus::Thinking,
        ])?;
        let mut orphaned = 0;
        for ctx in claimed {
            let reconciled = self.reconcile(ctx).await?;
            if reconciled.status == ContextStatus::Paused {
                orphaned += 1;
            } else if reconciled.kind == ContextKind::Project && !self.supervisor.is_active(reconciled.id) {
                info!(
                    target: "autocode::lifecycle",
                    "Reattaching work loop to project {}",
                    reconciled.id
                );
                self.spawn_work_loop(&reconciled);
            }
        }
        if orphaned > 0 {
            info!(target: "autocode::lifecycle", "Paused {} orphaned contexts", orphaned);
        }
        Ok(orphaned)
    }

    /// Cancel and await all background tasks. tmux sessions stay up.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn load_owned(&self, user_id: Uuid, id: Uuid) -> Result<WorkContext> {
        self.store
            .get_context(id)?
            .filter(|ctx| ctx.user_id == user_id)
            .ok_or(AutocodeError::ContextNotFound(id))
    }

    fn reload(&self, id: Uuid) -> Result<WorkContext> {
        self.store
            .get_context(id)?
            .ok_or(AutocodeError::ContextNotFound(id))
    }

    /// Rewrite a context claiming a live session to paused if tmux disagrees.
    ///
    /// A `thinking` context is left alone while its one-shot task runs. Once
    /// no task backs it (the server restarted mid-reply) the lost reply is
    /// noted in the transcript and the context drops to `idle`.
    async fn reconcile(&self, mut ctx: WorkContext) -> Result<WorkContext> {
        if ctx.status == ContextStatus::Thinking && !self.supervisor.is_active(ctx.id) {
            warn!(
                target: "autocode::lifecycle",
                "No reply in flight for thinking context {}",
                ctx.id
            );
            if self
                .store
                .set_status_if(ctx.id, ContextStatus::Thinking, ContextStatus::Idle)?
            {
                self.store.append_message(
                    ctx.user_id,
                    ctx.kind,
                    ctx.id,
                    Role::Assistant,
                    INTERRUPTED_REPLY,
                )?;
                ctx.status = ContextStatus::Idle;
            }
        }
        if !ctx.status.expects_live_session() {
            return Ok(ctx);
        }
        match self.multiplexer.exists(&ctx.tmux_session).await {
            Ok(true) => Ok(ctx),
            Ok(false) => {
                warn!(
                    target: "autocode::lifecycle",
                    "Session {} for {} is gone, marking paused",
                    ctx.tmux_session, ctx.id
                );
                self.supervisor.cancel(ctx.id);
                self.store.stop_running_instances(ctx.id)?;
                self.store.update_status(ctx.id, ContextStatus::Paused)?;
                self.activity(ctx.id, LogLevel::Warning, "Session gone, marked paused");
                ctx.status = ContextStatus::Paused;
                ctx.updated_at = Utc::now();
                Ok(ctx)
            }
            Err(e) => {
                warn!(
                    target: "autocode::lifecycle",
                    "Could not check session {}: {}",
                    ctx.tmux_session, e
                );
                Ok(ctx)
            }
        }
    }

    /// Create the session, type `command` and record a running instance.
    async fn launch(&self, ctx: &WorkContext, command: &str) -> Result<()> {
        std::fs::create_dir_all(&ctx.workspace_path)?;
        self.multiplexer
            .create(&ctx.tmux_session, &ctx.workspace_path)
            .await?;
        if let Err(e) = self.multiplexer.send_keys(&ctx.tmux_session, command).await {
            tmux::kill_best_effort(self.multiplexer.as_ref(), &ctx.tmux_session).await;
            return Err(e);
        }
        let instance = self.store.insert_instance(ctx.id, ctx.agent_id)?;
        debug!(
            target: "autocode::lifecycle",
            "Instance {} running in {}",
            instance.id, ctx.tmux_session
        );
        Ok(())
    }

    /// Stop background work, the session and instances; mark paused. Unless
    /// `force` is set, an already stopped context is left untouched.
    async fn halt(&self, ctx: &WorkContext, force: bool) -> Result<()> {
        self.supervisor.cancel(ctx.id);

        let has_running = self
            .store
            .list_instances(ctx.id)?
            .iter()
            .any(|i| i.status == InstanceStatus::Running);
        if !force && ctx.status == ContextStatus::Paused && !has_running {
            debug!(target: "autocode::lifecycle", "{} already stopped", ctx.id);
            return Ok(());
        }

        tmux::kill_best_effort(self.multiplexer.as_ref(), &ctx.tmux_session).await;
        let stopped = self.store.stop_running_instances(ctx.id)?;
        self.store.update_status(ctx.id, ContextStatus::Paused)?;
        self.activity(ctx.id, LogLevel::Info, "Stopped");
        info!(
            target: "autocode::lifecycle",
            "Stopped {} {} ({} instances)",
            ctx.kind, ctx.id, stopped
        );
        Ok(())
    }

    fn activity(&self, id: Uuid, level: LogLevel, message: &str) {
        if let Err(e) = self.store.append_log(id, level, message) {
            debug!(target: "autocode::lifecycle", "Failed to log activity for {}: {}", id, e);
        }
    }

    fn spawn_work_loop(&self, ctx: &WorkContext) {
        let work_loop = WorkLoop::new(
            ctx.id,
            ctx.tmux_session.clone(),
            self.store.clone(),
            self.multiplexer.clone(),
            self.detector.clone(),
            WorkLoopConfig {
                capture_lines: self.config.capture_lines,
                ..self.config.work_loop.clone()
            },
        );
        let id = ctx.id;
        self.supervisor.spawn(id, TaskKind::WorkLoop, move |token| async move {
            let outcome = work_loop.run(token).await;
            info!(target: "autocode::work_loop", "Work loop for {} ended: {:?}", id, outcome);
        });
    }

    fn spawn_one_shot(&self, ctx: &WorkContext, message: String, continuation: bool) {
        let store = self.store.clone();
        let runner = self.runner.clone();
        let workspace = ctx.workspace_path.clone();
        let (id, user_id, kind) = (ctx.id, ctx.user_id, ctx.kind);

        self.supervisor.spawn(id, TaskKind::OneShotMessage, move |token| async move {
            let reply = tokio::select! {
                _ = token.cancelled() => {
                    debug!(target: "autocode::runner", "One-shot for {} cancelled", id);
                    return;
                }
                result = runner.run(&workspace, &message, continuation) => result,
            };
            if token.is_cancelled() {
                return;
            }

            let content = match reply {
                Ok(text) => text,
                Err(e) => {
                    warn!(target: "autocode::runner", "One-shot for {} failed: {}", id, e);
                    let _ = store.append_log(id, LogLevel::Error, &format!("Message failed: {}", e));
                    format!("Error: {}", failure_detail(e))
                }
            };
            match store.append_message(user_id, kind, id, Role::Assistant, &content) {
                Ok(_) => {}
                Err(AutocodeError::ContextNotFound(_)) => {
                    debug!(target: "autocode::runner", "Context {} deleted before its reply", id);
                    return;
                }
                Err(e) => error!(target: "autocode::runner", "Failed to record reply for {}: {}", id, e),
            }
            // Leaves any status set meanwhile (paused, restarted) alone.
            if let Err(e) = store.set_status_if(id, ContextStatus::Thinking, ContextStatus::Idle) {
                error!(target: "autocode::runner", "Failed to mark {} idle: {}", id, e);
            }
        });
    }
}

/// Transcript entry standing in for a reply lost to a server restart.
const INTERRUPTED_REPLY: &str = "Error: interrupted before a reply arrived";

/// Status a context holds while its driven process is up.
fn live_status(kind: ContextKind) -> ContextStatus {
    match kind {
        ContextKind::Project => ContextStatus::Running,
        ContextKind::Research => ContextStatus::Active,
    }
}

fn failure_detail(err: AutocodeError) -> String {
    match err {
        AutocodeError::DrivenCliFailed { stderr, .. } if !stderr.is_empty() => stderr,
        other => other.to_string(),
    }
}
