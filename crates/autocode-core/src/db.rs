//! SQLite persistence for work contexts, steps, instances and transcripts.

use crate::{AutocodeError, Result};
use autocode_types::{
    AgentInstance, ChatMessage, ContextKind, ContextStatus, ContextUpdate, InstanceStatus,
    LogEntry, LogLevel, Role, WorkContext, WorkStep,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// SQLite-based store. The relational record is the source of truth for
/// context status; the multiplexer is only ever reconciled against it.
pub struct ContextStore {
    conn: Mutex<Connection>,
}

impl ContextStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::from_connection(Connection::open(path)?)?;
        info!(target: "autocode::store", "Opened database at {:?}", path);
        Ok(store)
    }

    /// Fresh in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave SQLite half-written.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS work_contexts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                slug TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                architecture TEXT NOT NULL DEFAULT '',
                workspace_path TEXT NOT NULL UNIQUE,
                tmux_session TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_contexts_owner ON work_contexts(user_id, agent_id, kind);
            CREATE INDEX IF NOT EXISTS idx_contexts_status ON work_contexts(status);

            CREATE TABLE IF NOT EXISTS work_steps (
                id TEXT PRIMARY KEY,
                context_id TEXT NOT NULL REFERENCES work_contexts(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                prompt TEXT NOT NULL,
                done INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (context_id, position)
            );

            CREATE TABLE IF NOT EXISTS agent_instances (
                id TEXT PRIMARY KEY,
                context_id TEXT NOT NULL REFERENCES work_contexts(id) ON DELETE CASCADE,
                agent_id TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                stopped_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_instances_context ON agent_instances(context_id, status);

            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                session_type TEXT NOT NULL,
                session_id TEXT NOT NULL REFERENCES work_contexts(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session ON chat_messages(session_type, session_id);

            CREATE TABLE IF NOT EXISTS context_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                context_id TEXT NOT NULL REFERENCES work_contexts(id) ON DELETE CASCADE,
                level TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_logs_context ON context_logs(context_id, id);
            "#,
        )?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Work contexts
    // ---------------------------------------------------------------------

    /// Insert a new context. A duplicate session name or workspace path is
    /// reported as [`AutocodeError::ContextAlreadyExists`].
    pub fn insert_context(&self, ctx: &WorkContext) -> Result<()> {
        let conn = self.conn();
        let result = conn.execute(
            r#"
            INSERT INTO work_contexts (
                id, user_id, agent_id, kind, name, slug, description, architecture,
                workspace_path, tmux_session, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                ctx.id.to_string(),
                ctx.user_id.to_string(),
                ctx.agent_id.to_string(),
                ctx.kind.as_str(),
                ctx.name,
                ctx.slug,
                ctx.description,
                ctx.architecture,
                ctx.workspace_path.to_string_lossy(),
                ctx.tmux_session,
                ctx.status.as_str(),
                ctx.created_at.to_rfc3339(),
                ctx.updated_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(AutocodeError::ContextAlreadyExists(ctx.tmux_session.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_context(&self, id: Uuid) -> Result<Option<WorkContext>> {
        let conn = self.conn();
        let ctx = conn
            .query_row(
                "SELECT * FROM work_contexts WHERE id = ?1",
                params![id.to_string()],
                Self::row_to_context,
            )
            .optional()?;
        Ok(ctx)
    }

    pub fn find_by_session(&self, tmux_session: &str) -> Result<Option<WorkContext>> {
        let conn = self.conn();
        let ctx = conn
            .query_row(
                "SELECT * FROM work_contexts WHERE tmux_session = ?1",
                params![tmux_session],
                Self::row_to_context,
            )
            .optional()?;
        Ok(ctx)
    }

    /// Contexts of one kind owned by a user and agent, oldest first.
    pub fn list_contexts(
        &self,
        user_id: Uuid,
        agent_id: Uuid,
        kind: ContextKind,
    ) -> Result<Vec<WorkContext>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM work_contexts
            WHERE user_id = ?1 AND agent_id = ?2 AND kind = ?3
            ORDER BY created_at ASC
            "#,
        )?;
        let contexts = stmt
            .query_map(
                params![user_id.to_string(), agent_id.to_string(), kind.as_str()],
                Self::row_to_context,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(contexts)
    }

    /// Contexts in any of the given statuses.
    pub fn list_by_status(&self, statuses: &[ContextStatus]) -> Result<Vec<WorkContext>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT * FROM work_contexts WHERE status = ?1")?;
        let mut contexts = Vec::new();
        for status in statuses {
            let rows = stmt
                .query_map(params![status.as_str()], Self::row_to_context)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            contexts.extend(rows);
        }
        Ok(contexts)
    }

    /// Update status and touch `updated_at`.
    pub fn update_status(&self, id: Uuid, status: ContextStatus) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE work_contexts SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }

    /// Set status only if it currently is `expected`. Returns whether it changed.
    pub fn set_status_if(&self, id: Uuid, expected: ContextStatus, status: ContextStatus) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE work_contexts SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                status.as_str(),
                Utc::now().to_rfc3339(),
                id.to_string(),
                expected.as_str()
            ],
        )?;
        Ok(changed > 0)
    }

    /// Move into `status` unless the context is already in it. Returns false
    /// when another caller got there first.
    pub fn enter_status(&self, id: Uuid, status: ContextStatus) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE work_contexts SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status != ?1",
            params![status.as_str(), Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(changed > 0)
    }

    /// Apply the set fields of `update` and touch `updated_at`.
    pub fn update_details(&self, id: Uuid, update: &ContextUpdate) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            r#"
            UPDATE work_contexts SET
                name = COALESCE(?1, name),
                description = COALESCE(?2, description),
                architecture = COALESCE(?3, architecture),
                updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                update.name,
                update.description,
                update.architecture,
                Utc::now().to_rfc3339(),
                id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Delete a context together with its steps, instances, transcript and log.
    pub fn delete_context(&self, id: Uuid) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let id = id.to_string();
        tx.execute("DELETE FROM work_steps WHERE context_id = ?1", params![id])?;
        tx.execute("DELETE FROM agent_instances WHERE context_id = ?1", params![id])?;
        tx.execute("DELETE FROM chat_messages WHERE session_id = ?1", params![id])?;
        tx.execute("DELETE FROM context_logs WHERE context_id = ?1", params![id])?;
        let removed = tx.execute("DELETE FROM work_contexts WHERE id = ?1", params![id])?;
        tx.commit()?;
        debug!(target: "autocode::store", "Deleted context {} ({} rows)", id, removed);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Work steps
    // ---------------------------------------------------------------------

    /// Append steps after the context's current last position.
    pub fn append_steps(&self, context_id: Uuid, prompts: &[String]) -> Result<Vec<WorkStep>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM work_steps WHERE context_id = ?1",
            params![context_id.to_string()],
            |row| row.get(0),
        )?;
        let now = Utc::now();
        let mut steps = Vec::with_capacity(prompts.len());
        for (offset, prompt) in prompts.iter().enumerate() {
            let step = WorkStep {
                id: Uuid::new_v4(),
                context_id,
                position: (next as u32) + offset as u32,
                prompt: prompt.clone(),
                done: false,
                completed_at: None,
                created_at: now,
            };
            tx.execute(
                r#"
                INSERT INTO work_steps (id, context_id, position, prompt, done, created_at)
                VALUES (?1, ?2, ?3, ?4, 0, ?5)
                "#,
                params![
                    step.id.to_string(),
                    context_id.to_string(),
                    step.position,
                    step.prompt,
                    now.to_rfc3339(),
                ],
            )?;
            steps.push(step);
        }
        tx.commit()?;
        Ok(steps)
    }

    pub fn list_steps(&self, context_id: Uuid) -> Result<Vec<WorkStep>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT * FROM work_steps WHERE context_id = ?1 ORDER BY position ASC")?;
        let steps = stmt
            .query_map(params![context_id.to_string()], Self::row_to_step)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(steps)
    }

    /// Lowest-positioned step that is not done yet.
    pub fn next_pending_step(&self, context_id: Uuid) -> Result<Option<WorkStep>> {
        let conn = self.conn();
        let step = conn
            .query_row(
                r#"
                SELECT * FROM work_steps
                WHERE context_id = ?1 AND done = 0
                ORDER BY position ASC
                LIMIT 1
                "#,
                params![context_id.to_string()],
                Self::row_to_step,
            )
            .optional()?;
        Ok(step)
    }

    pub fn mark_step_done(&self, step_id: Uuid) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE work_steps SET done = 1, completed_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), step_id.to_string()],
        )?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Agent instances
    // ---------------------------------------------------------------------

    /// Record a freshly started driven process.
    pub fn insert_instance(&self, context_id: Uuid, agent_id: Uuid) -> Result<AgentInstance> {
        let instance = AgentInstance {
            id: Uuid::new_v4(),
            context_id,
            agent_id,
            status: InstanceStatus::Running,
            started_at: Utc::now(),
            stopped_at: None,
        };
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO agent_instances (id, context_id, agent_id, status, started_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                instance.id.to_string(),
                context_id.to_string(),
                agent_id.to_string(),
                instance.status.as_str(),
                instance.started_at.to_rfc3339(),
            ],
        )?;
        Ok(instance)
    }

    /// Mark every running instance of a context as stopped. Returns how many
    /// rows changed.
    pub fn stop_running_instances(&self, context_id: Uuid) -> Result<usize> {
        let conn = self.conn();
        let changed = conn.execute(
            r#"
            UPDATE agent_instances SET status = ?1, stopped_at = ?2
            WHERE context_id = ?3 AND status = ?4
            "#,
            params![
                InstanceStatus::Stopped.as_str(),
                Utc::now().to_rfc3339(),
                context_id.to_string(),
                InstanceStatus::Running.as_str(),
            ],
        )?;
        Ok(changed)
    }

    pub fn list_instances(&self, context_id: Uuid) -> Result<Vec<AgentInstance>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM agent_instances WHERE context_id = ?1 ORDER BY started_at ASC",
        )?;
        let instances = stmt
            .query_map(params![context_id.to_string()], Self::row_to_instance)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(instances)
    }

    // ---------------------------------------------------------------------
    // Transcript
    // ---------------------------------------------------------------------

    /// Append to a transcript. A context deleted in the meantime is reported
    /// as [`AutocodeError::ContextNotFound`].
    pub fn append_message(
        &self,
        user_id: Uuid,
        session_type: ContextKind,
        session_id: Uuid,
        role: Role,
        content: &str,
    ) -> Result<ChatMessage> {
        let now = Utc::now();
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO chat_messages (user_id, session_type, session_id, role, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                user_id.to_string(),
                session_type.as_str(),
                session_id.to_string(),
                role.as_str(),
                content,
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| missing_context(e, session_id))?;
        Ok(ChatMessage {
            id: conn.last_insert_rowid(),
            user_id,
            session_type,
            session_id,
            role,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Transcript of one context in creation order.
    pub fn list_messages(&self, session_type: ContextKind, session_id: Uuid) -> Result<Vec<ChatMessage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM chat_messages
            WHERE session_type = ?1 AND session_id = ?2
            ORDER BY created_at ASC, id ASC
            "#,
        )?;
        let messages = stmt
            .query_map(
                params![session_type.as_str(), session_id.to_string()],
                Self::row_to_message,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    pub fn count_messages(&self, session_type: ContextKind, session_id: Uuid) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE session_type = ?1 AND session_id = ?2",
            params![session_type.as_str(), session_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ---------------------------------------------------------------------
    // Activity log
    // ---------------------------------------------------------------------

    pub fn append_log(&self, context_id: Uuid, level: LogLevel, message: &str) -> Result<LogEntry> {
        let now = Utc::now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO context_logs (context_id, level, message, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![context_id.to_string(), level.as_str(), message, now.to_rfc3339()],
        )
        .map_err(|e| missing_context(e, context_id))?;
        Ok(LogEntry {
            id: conn.last_insert_rowid(),
            context_id,
            level,
            message: message.to_string(),
            timestamp: now,
        })
    }

    /// Log entries with an id greater than `after_id`, oldest first.
    pub fn logs_after(&self, context_id: Uuid, after_id: i64, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM context_logs
            WHERE context_id = ?1 AND id > ?2
            ORDER BY id ASC
            LIMIT ?3
            "#,
        )?;
        let entries = stmt
            .query_map(
                params![context_id.to_string(), after_id, limit as i64],
                Self::row_to_log,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ---------------------------------------------------------------------
    // Row mapping
    // ---------------------------------------------------------------------

    fn row_to_context(row: &rusqlite::Row) -> rusqlite::Result<WorkContext> {
        let workspace_path: String = row.get("workspace_path")?;
        Ok(WorkContext {
            id: parse_uuid(row, "id")?,
            user_id: parse_uuid(row, "user_id")?,
            agent_id: parse_uuid(row, "agent_id")?,
            kind: parse_text(row, "kind")?,
            name: row.get("name")?,
            slug: row.get("slug")?,
            description: row.get("description")?,
            architecture: row.get("architecture")?,
            workspace_path: workspace_path.into(),
            tmux_session: row.get("tmux_session")?,
            status: parse_text(row, "status")?,
            created_at: parse_time(row, "created_at")?,
            updated_at: parse_time(row, "updated_at")?,
        })
    }

    fn row_to_step(row: &rusqlite::Row) -> rusqlite::Result<WorkStep> {
        let completed_at: Option<String> = row.get("completed_at")?;
        Ok(WorkStep {
            id: parse_uuid(row, "id")?,
            context_id: parse_uuid(row, "context_id")?,
            position: row.get("position")?,
            prompt: row.get("prompt")?,
            done: row.get("done")?,
            completed_at: completed_at.as_deref().and_then(parse_rfc3339),
            created_at: parse_time(row, "created_at")?,
        })
    }

    fn row_to_instance(row: &rusqlite::Row) -> rusqlite::Result<AgentInstance> {
        let status: String = row.get("status")?;
        let stopped_at: Option<String> = row.get("stopped_at")?;
        Ok(AgentInstance {
            id: parse_uuid(row, "id")?,
            context_id: parse_uuid(row, "context_id")?,
            agent_id: parse_uuid(row, "agent_id")?,
            status: if status == InstanceStatus::Running.as_str() {
                InstanceStatus::Running
            } else {
                InstanceStatus::Stopped
            },
            started_at: parse_time(row, "started_at")?,
            stopped_at: stopped_at.as_deref().and_then(parse_rfc3339),
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<ChatMessage> {
        Ok(ChatMessage {
            id: row.get("id")?,
            user_id: parse_uuid(row, "user_id")?,
            session_type: parse_text(row, "session_type")?,
            session_id: parse_uuid(row, "session_id")?,
            role: parse_text(row, "role")?,
            content: row.get("content")?,
            created_at: parse_time(row, "created_at")?,
        })
    }

    fn row_to_log(row: &rusqlite::Row) -> rusqlite::Result<LogEntry> {
        Ok(LogEntry {
            id: row.get("id")?,
            context_id: parse_uuid(row, "context_id")?,
            level: parse_text(row, "level")?,
            message: row.get("message")?,
            timestamp: parse_time(row, "timestamp")?,
        })
    }
}

fn missing_context(err: rusqlite::Error, id: Uuid) -> AutocodeError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            AutocodeError::ContextNotFound(id)
        }
        other => other.into(),
    }
}

fn conversion_error(
    column: &str,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("{}: {}", column, err).into(),
    )
}

fn parse_uuid(row: &rusqlite::Row, column: &str) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(column)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(column, e))
}

fn parse_text<T>(row: &rusqlite::Row, column: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|e| conversion_error(column, e))
}

fn parse_time(row: &rusqlite::Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn context(kind: ContextKind, session: &str) -> WorkContext {
        let now = Utc::now();
        WorkContext {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            kind,
            name: "Demo".to_string(),
            slug: "demo".to_string(),
            description: "A demo".to_string(),
            architecture: String::new(),
            workspace_path: PathBuf::from(format!("/tmp/{}", session)),
            tmux_session: session.to_string(),
            status: ContextStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_and_get_context() {
        let store = ContextStore::open_in_memory().unwrap();
        let ctx = context(ContextKind::Project, "alice-project-demo");
        store.insert_context(&ctx).unwrap();

        let loaded = store.get_context(ctx.id).unwrap().unwrap();
        assert_eq!(loaded.tmux_session, "alice-project-demo");
        assert_eq!(loaded.kind, ContextKind::Project);
        assert_eq!(loaded.status, ContextStatus::Pending);
        assert!(store.get_context(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_session_name_rejected() {
        let store = ContextStore::open_in_memory().unwrap();
        store
            .insert_context(&context(ContextKind::Project, "bob-project-x"))
            .unwrap();
        let err = store
            .insert_context(&context(ContextKind::Project, "bob-project-x"))
            .unwrap_err();
        assert!(matches!(err, AutocodeError::ContextAlreadyExists(name) if name == "bob-project-x"));
    }

    #[test]
    fn test_steps_are_consumed_in_order() {
        let store = ContextStore::open_in_memory().unwrap();
        let ctx = context(ContextKind::Project, "c-project-steps");
        store.insert_context(&ctx).unwrap();

        store
            .append_steps(ctx.id, &["first".to_string(), "second".to_string()])
            .unwrap();
        let more = store.append_steps(ctx.id, &["third".to_string()]).unwrap();
        assert_eq!(more[0].position, 2);

        let first = store.next_pending_step(ctx.id).unwrap().unwrap();
        assert_eq!(first.prompt, "first");
        store.mark_step_done(first.id).unwrap();

        let second = store.next_pending_step(ctx.id).unwrap().unwrap();
        assert_eq!(second.prompt, "second");

        let steps = store.list_steps(ctx.id).unwrap();
        assert!(steps[0].done && steps[0].completed_at.is_some());
        assert!(!steps[1].done);
    }

    #[test]
    fn test_stop_running_instances() {
        let store = ContextStore::open_in_memory().unwrap();
        let ctx = context(ContextKind::Project, "d-project-inst");
        store.insert_context(&ctx).unwrap();

        store.insert_instance(ctx.id, ctx.agent_id).unwrap();
        assert_eq!(store.stop_running_instances(ctx.id).unwrap(), 1);
        assert_eq!(store.stop_running_instances(ctx.id).unwrap(), 0);

        let instances = store.list_instances(ctx.id).unwrap();
        assert_eq!(instances[0].status, InstanceStatus::Stopped);
        assert!(instances[0].stopped_at.is_some());
    }

    #[test]
    fn test_delete_cascades_children() {
        let store = ContextStore::open_in_memory().unwrap();
        let ctx = context(ContextKind::Research, "e-research-del");
        store.insert_context(&ctx).unwrap();
        store.append_steps(ctx.id, &["step".to_string()]).unwrap();
        store.insert_instance(ctx.id, ctx.agent_id).unwrap();
        store
            .append_message(ctx.user_id, ctx.kind, ctx.id, Role::User, "hi")
            .unwrap();

        store.delete_context(ctx.id).unwrap();

        assert!(store.get_context(ctx.id).unwrap().is_none());
        assert!(store.list_steps(ctx.id).unwrap().is_empty());
        assert!(store.list_instances(ctx.id).unwrap().is_empty());
        assert_eq!(store.count_messages(ctx.kind, ctx.id).unwrap(), 0);
    }

    #[test]
    fn test_messages_keep_insertion_order() {
        let store = ContextStore::open_in_memory().unwrap();
        let ctx = context(ContextKind::Research, "f-research-msgs");
        store.insert_context(&ctx).unwrap();

        store
            .append_message(ctx.user_id, ctx.kind, ctx.id, Role::User, "question")
            .unwrap();
        store
            .append_message(ctx.user_id, ctx.kind, ctx.id, Role::Assistant, "answer")
            .unwrap();

        let messages = store.list_messages(ctx.kind, ctx.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "answer");
    }

    #[test]
    fn test_list_by_status() {
        let store = ContextStore::open_in_memory().unwrap();
        let ctx = context(ContextKind::Project, "g-project-status");
        store.insert_context(&ctx).unwrap();
        store.update_status(ctx.id, ContextStatus::Running).unwrap();

        let running = store
            .list_by_status(&[ContextStatus::Running, ContextStatus::Active])
            .unwrap();
        assert_eq!(running.len(), 1);
        assert!(store.list_by_status(&[ContextStatus::Failed]).unwrap().is_empty());
    }

    #[test]
    fn test_message_for_deleted_context_is_rejected() {
        let store = ContextStore::open_in_memory().unwrap();
        let ctx = context(ContextKind::Research, "h-research-gone");
        store.insert_context(&ctx).unwrap();
        store.delete_context(ctx.id).unwrap();

        let err = store
            .append_message(ctx.user_id, ctx.kind, ctx.id, Role::Assistant, "late reply")
            .unwrap_err();
        assert!(matches!(err, AutocodeError::ContextNotFound(id) if id == ctx.id));
        assert_eq!(store.count_messages(ctx.kind, ctx.id).unwrap(), 0);
    }

    #[test]
    fn test_conditional_status_writes() {
        let store = ContextStore::open_in_memory().unwrap();
        let ctx = context(ContextKind::Research, "i-research-cas");
        store.insert_context(&ctx).unwrap();

        assert!(store.enter_status(ctx.id, ContextStatus::Thinking).unwrap());
        assert!(!store.enter_status(ctx.id, ContextStatus::Thinking).unwrap());

        assert!(!store
            .set_status_if(ctx.id, ContextStatus::Active, ContextStatus::Idle)
            .unwrap());
        assert!(store
            .set_status_if(ctx.id, ContextStatus::Thinking, ContextStatus::Idle)
            .unwrap());
        assert_eq!(store.get_context(ctx.id).unwrap().unwrap().status, ContextStatus::Idle);
    }

    #[test]
    fn test_update_details_keeps_unset_fields() {
        let store = ContextStore::open_in_memory().unwrap();
        let ctx = context(ContextKind::Project, "j-project-edit");
        store.insert_context(&ctx).unwrap();

        store
            .update_details(
                ctx.id,
                &ContextUpdate {
                    architecture: Some("Axum + SQLite".to_string()),
                    ..ContextUpdate::default()
                },
            )
            .unwrap();

        let loaded = store.get_context(ctx.id).unwrap().unwrap();
        assert_eq!(loaded.architecture, "Axum + SQLite");
        assert_eq!(loaded.description, "A demo");
        assert_eq!(loaded.name, "Demo");
        assert!(loaded.updated_at >= ctx.updated_at);
    }

    #[test]
    fn test_logs_resume_after_last_id() {
        let store = ContextStore::open_in_memory().unwrap();
        let ctx = context(ContextKind::Project, "k-project-logs");
        store.insert_context(&ctx).unwrap();

        let first = store.append_log(ctx.id, LogLevel::Info, "started").unwrap();
        store.append_log(ctx.id, LogLevel::Warning, "step 0 stalled").unwrap();
        store.append_log(ctx.id, LogLevel::Error, "failed").unwrap();

        let all = store.logs_after(ctx.id, 0, 100).unwrap();
        assert_eq!(all.len(), 3);
        let rest = store.logs_after(ctx.id, first.id, 1).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].level, LogLevel::Warning);
        assert_eq!(rest[0].message, "step 0 stalled");

        store.delete_context(ctx.id).unwrap();
        assert!(store.logs_after(ctx.id, 0, 100).unwrap().is_empty());
        assert!(store.append_log(ctx.id, LogLevel::Info, "late").is_err());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("autocode.db");
        ContextStore::open(&path).unwrap();
        assert!(path.exists());
    }
}
