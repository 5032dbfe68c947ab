//! Per-context workspace directories.
//!
//! Each context exclusively owns one directory under
//! `<data_dir>/<username>/<projects|research>/<slug>`.

use crate::{AutocodeError, Result};
use autocode_types::{AgentProfile, ContextKind};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

const DEFAULT_RESEARCH_IDENTITY: &str = "You are a research assistant.";

/// Workspace path for a context.
pub fn workspace_path(data_dir: &Path, username: &str, kind: ContextKind, slug: &str) -> PathBuf {
    data_dir.join(username).join(kind.workspace_dir()).join(slug)
}

/// Create a project workspace with its `.claude/CLAUDE.md` and
/// `.nanobot/IDENTITY.md` files.
pub fn provision_project(
    workspace: &Path,
    name: &str,
    description: &str,
    architecture: &str,
    agent: &AgentProfile,
) -> Result<()> {
    std::fs::create_dir_all(workspace)?;

    let mut claude_md = format!("# {}\n\n{}\n", name, description);
    if !architecture.is_empty() {
        claude_md.push_str(&format!("\n## Architecture\n\n{}\n", architecture));
    }
    let claude_dir = workspace.join(".claude");
    std::fs::create_dir_all(&claude_dir)?;
    std::fs::write(claude_dir.join("CLAUDE.md"), claude_md)?;

    let mut identity = String::new();
    if !agent.global_rules.is_empty() {
        identity.push_str(&format!("# Global Rules\n\n{}\n\n", agent.global_rules));
    }
    identity.push_str(&format!("# Project: {}\n\n{}\n", name, description));
    if !architecture.is_empty() {
        identity.push_str(&format!("\n## Architecture\n\n{}\n", architecture));
    }
    let nanobot_dir = workspace.join(".nanobot");
    std::fs::create_dir_all(&nanobot_dir)?;
    std::fs::write(nanobot_dir.join("IDENTITY.md"), identity)?;

    info!(target: "autocode::workspace", "Provisioned project workspace {:?}", workspace);
    Ok(())
}

/// Create a research workspace whose `CLAUDE.md` carries the agent persona.
pub fn provision_research(workspace: &Path, agent: &AgentProfile) -> Result<()> {
    std::fs::create_dir_all(workspace)?;
    let identity = if agent.identity.trim().is_empty() {
        DEFAULT_RESEARCH_IDENTITY
    } else {
        agent.identity.as_str()
    };
    std::fs::write(workspace.join("CLAUDE.md"), identity)?;
    info!(target: "autocode::workspace", "Provisioned research workspace {:?}", workspace);
    Ok(())
}

/// Recursively remove a workspace. Absent directories are fine.
pub fn remove(workspace: &Path) -> Result<()> {
    match std::fs::remove_dir_all(workspace) {
        Ok(()) => {
            info!(target: "autocode::workspace", "Removed workspace {:?}", workspace);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(target: "autocode::workspace", "Workspace {:?} already gone", workspace);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// A Markdown file produced inside a workspace.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceFile {
    pub name: String,
    /// Path relative to the workspace root.
    pub path: String,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub modified_at: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    pub name: String,
    pub path: String,
    pub content: String,
}

/// Markdown files in the workspace, newest first. Hidden directories such as
/// `.claude/` are skipped.
pub fn list_markdown(workspace: &Path) -> Result<Vec<WorkspaceFile>> {
    let mut files = Vec::new();
    if workspace.is_dir() {
        collect_markdown(workspace, workspace, &mut files)?;
    }
    files.sort_by(|a, b| b.modified_at.total_cmp(&a.modified_at));
    Ok(files)
}

fn collect_markdown(root: &Path, dir: &Path, out: &mut Vec<WorkspaceFile>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_markdown(root, &path, out)?;
        } else if file_type.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            let meta = entry.metadata()?;
            let modified_at = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or_default();
            let relative = path.strip_prefix(root).unwrap_or(&path);
            out.push(WorkspaceFile {
                name,
                path: relative.to_string_lossy().into_owned(),
                size: meta.len(),
                modified_at,
            });
        }
    }
    Ok(())
}

/// Read a file by workspace-relative path, refusing anything that escapes
/// the workspace.
pub fn read_file(workspace: &Path, relative: &str) -> Result<FileContent> {
    let requested = Path::new(relative);
    if requested.is_absolute()
        || requested
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(AutocodeError::InvalidPath(relative.to_string()));
    }

    let target = workspace.join(requested);
    if !target.is_file() {
        return Err(AutocodeError::FileNotFound(relative.to_string()));
    }

    // Symlinks could still point outside.
    let root = workspace.canonicalize()?;
    let resolved = target.canonicalize()?;
    if !resolved.starts_with(&root) {
        return Err(AutocodeError::InvalidPath(relative.to_string()));
    }

    let content = std::fs::read_to_string(&resolved)?;
    Ok(FileContent {
        name: resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: relative.to_string(),
        content,
    })
}
