//! Server configuration.

use anyhow::{bail, Result};
use autocode_core::{WorkLoopConfig, WorkManagerConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Root directory holding every user's workspaces.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_claude_path")]
    pub claude_path: PathBuf,
    #[serde(default = "default_launch_command")]
    pub launch_command: String,
    #[serde(default = "default_resume_command")]
    pub resume_command: String,
    #[serde(default = "default_capture_lines")]
    pub capture_lines: usize,
    #[serde(default = "default_stream_interval_ms")]
    pub stream_interval_ms: u64,
    /// Poll interval of activity log WebSocket subscribers.
    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,
    /// Allowed CORS origins. Empty allows any.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub work_loop: WorkLoopSettings,
}

/// `[work_loop]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkLoopSettings {
    pub warmup_secs: u64,
    pub poll_interval_secs: u64,
    pub step_timeout_secs: u64,
    pub stall_polls: u32,
    pub max_retries: u32,
}

impl Default for WorkLoopSettings {
    fn default() -> Self {
        Self {
            warmup_secs: 5,
            poll_interval_secs: 2,
            step_timeout_secs: 300,
            stall_polls: 150,
            max_retries: 3,
        }
    }
}

fn autocode_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autocode")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_data_dir() -> PathBuf {
    autocode_dir().join("users")
}

fn default_db_path() -> PathBuf {
    autocode_dir().join("autocode.db")
}

fn default_claude_path() -> PathBuf {
    PathBuf::from("claude")
}

fn default_launch_command() -> String {
    "claude".to_string()
}

fn default_resume_command() -> String {
    "claude --continue".to_string()
}

fn default_capture_lines() -> usize {
    200
}

fn default_stream_interval_ms() -> u64 {
    500
}

fn default_log_interval_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            db_path: default_db_path(),
            claude_path: default_claude_path(),
            launch_command: default_launch_command(),
            resume_command: default_resume_command(),
            capture_lines: default_capture_lines(),
            stream_interval_ms: default_stream_interval_ms(),
            log_interval_ms: default_log_interval_ms(),
            cors_origins: Vec::new(),
            work_loop: WorkLoopSettings::default(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a poll loop spin without sleeping.
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("stream_interval_ms", self.stream_interval_ms),
            ("log_interval_ms", self.log_interval_ms),
            ("work_loop.poll_interval_secs", self.work_loop.poll_interval_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
        }
        if self.work_loop.max_retries == 0 {
            bail!("work_loop.max_retries must be greater than zero");
        }
        Ok(())
    }

    /// Load config from default location (config/default.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }
        Ok(Config::default())
    }

    /// Settings for the core work manager.
    pub fn work_manager_config(&self) -> WorkManagerConfig {
        WorkManagerConfig {
            data_dir: self.data_dir.clone(),
            db_path: self.db_path.clone(),
            claude_path: self.claude_path.clone(),
            launch_command: self.launch_command.clone(),
            resume_command: self.resume_command.clone(),
            capture_lines: self.capture_lines,
            stream_interval: Duration::from_millis(self.stream_interval_ms),
            log_interval: Duration::from_millis(self.log_interval_ms),
            work_loop: WorkLoopConfig {
                warmup: Duration::from_secs(self.work_loop.warmup_secs),
                poll_interval: Duration::from_secs(self.work_loop.poll_interval_secs),
                step_timeout: Duration::from_secs(self.work_loop.step_timeout_secs),
                stall_polls: self.work_loop.stall_polls,
                max_retries: self.work_loop.max_retries,
                capture_lines: self.capture_lines,
            },
        }
    }
}
