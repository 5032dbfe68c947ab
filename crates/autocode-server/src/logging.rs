//! Logging setup.
//!
//! A preset chosen by CLI flags supplies the base directives for the
//! `autocode::*` targets; `--log target=level` entries are appended after it
//! and win. `RUST_LOG`, when set, replaces all of it.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const TARGET_PREFIX: &str = "autocode::";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: '{}'. Use 'text' or 'json'.", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Lifecycle transitions and API traffic; tmux chatter hidden.
    #[default]
    Production,
    Verbose,
    /// Everything at debug except per-tick tmux calls from streaming.
    Debug,
    Trace,
    /// Warnings and errors only.
    Quiet,
}

impl LogPreset {
    /// Most specific flag wins: quiet, then trace, debug, verbose.
    pub fn from_flags(verbose: bool, debug: bool, trace: bool, quiet: bool) -> Self {
        if quiet {
            LogPreset::Quiet
        } else if trace {
            LogPreset::Trace
        } else if debug {
            LogPreset::Debug
        } else if verbose {
            LogPreset::Verbose
        } else {
            LogPreset::Production
        }
    }

    fn directives(self) -> &'static [&'static str] {
        match self {
            LogPreset::Production => &[
                "autocode::startup=info",
                "autocode::api=info",
                "autocode::ws=info",
                "autocode::lifecycle=info",
                "autocode::work_loop=info",
                "autocode::runner=info",
                "autocode::workspace=warn",
                "autocode::supervisor=warn",
                "autocode::tmux=warn",
                "autocode::store=warn",
                "tower_http=warn",
            ],
            LogPreset::Verbose => &["autocode=info", "tower_http=info"],
            LogPreset::Debug => &["autocode=debug", "autocode::tmux=info", "tower_http=debug"],
            LogPreset::Trace => &["autocode=trace", "tower_http=trace"],
            LogPreset::Quiet => &["autocode=warn", "tower_http=error"],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub preset: LogPreset,
    /// Fully qualified target and level, in the order given.
    pub overrides: Vec<(String, Level)>,
    pub format: LogFormat,
}

impl LogConfig {
    pub fn from_cli(
        verbose: bool,
        debug: bool,
        trace: bool,
        quiet: bool,
        log_overrides: Vec<String>,
        format: LogFormat,
    ) -> Self {
        let overrides = log_overrides
            .iter()
            .flat_map(|arg| arg.split(','))
            .filter_map(parse_override)
            .collect();

        Self {
            preset: LogPreset::from_flags(verbose, debug, trace, quiet),
            overrides,
            format,
        }
    }

    /// Level set for `target` by overrides, if any. Later entries win.
    pub fn override_for(&self, target: &str) -> Option<Level> {
        self.overrides
            .iter()
            .rev()
            .find(|(t, _)| t == target)
            .map(|(_, level)| *level)
    }

    /// Filter directives without consulting the environment.
    pub fn directives(&self) -> String {
        let mut directives: Vec<String> = self
            .preset
            .directives()
            .iter()
            .map(|d| d.to_string())
            .collect();
        for (target, level) in &self.overrides {
            directives.push(format!("{}={}", target, level.as_str().to_lowercase()));
        }
        directives.join(",")
    }

    pub fn build_filter(&self) -> EnvFilter {
        if let Ok(env_filter) = EnvFilter::try_from_default_env() {
            return env_filter;
        }
        EnvFilter::try_new(self.directives()).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Parse `target=level`, qualifying bare targets with `autocode::`.
fn parse_override(part: &str) -> Option<(String, Level)> {
    let (target, level) = part.split_once('=')?;
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    let level = match level.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => return None,
    };
    let target = if target.starts_with(TARGET_PREFIX) || target == "autocode" || target == "tower_http" {
        target.to_string()
    } else {
        format!("{}{}", TARGET_PREFIX, target)
    };
    Some((target, level))
}

pub fn init(config: &LogConfig) {
    let filter = config.build_filter();
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init(),
    }
}
