//! Work context lifecycle and tmux bridging for AutoCode.

pub mod bridge;
mod db;
mod detector;
mod error;
mod lifecycle;
mod runner;
pub mod slug;
mod supervisor;
pub mod tmux;
pub mod work_loop;
pub mod workspace;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use bridge::{PaneDiffer, pump_logs, pump_pane};
pub use db::ContextStore;
pub use detector::{CompletionDetector, PromptGlyphDetector, ends_with_prompt};
pub use error::AutocodeError;
pub use lifecycle::{
    Backends, CreateProjectOptions, CreateResearchOptions, WorkManager, WorkManagerConfig,
};
pub use runner::{ClaudeRunner, PromptRunner};
pub use supervisor::{TaskKind, TaskSupervisor};
pub use tmux::{Multiplexer, TmuxMultiplexer};
pub use work_loop::{LoopOutcome, WorkLoop, WorkLoopConfig};
pub use workspace::{FileContent, WorkspaceFile};

/// Result type for AutoCode operations.
pub type Result<T> = std::result::Result<T, AutocodeError>;
