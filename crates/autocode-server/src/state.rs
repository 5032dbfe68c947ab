//! Shared application state.

use crate::config::Config;
use autocode_core::WorkManager;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub work_manager: Arc<WorkManager>,
    pub config: Config,
}

impl AppState {
    /// Open the store and drive the real tmux and Claude CLI.
    pub fn new(config: Config) -> autocode_core::Result<Self> {
        let work_manager = Arc::new(WorkManager::new(config.work_manager_config())?);
        Ok(Self {
            work_manager,
            config,
        })
    }

    /// State around an already built manager, e.g. one with fake backends.
    pub fn with_manager(config: Config, work_manager: WorkManager) -> Self {
        Self {
            work_manager: Arc::new(work_manager),
            config,
        }
    }
}
