use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;

/// Dependencies that drown the stream logs at `trace`.
const NOISY_DEPENDENCIES: &[&str] = &[
    "hyper",
    "tokio_tungstenite",
    "tungstenite",
    "reqwest",
    "rustls",
    "mio",
];

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
}

impl LogConfig {
    /// The terminal is in raw mode while a view is mounted, so anything
    /// chattier than `warn` goes to a file instead of stderr.
    pub fn for_raw_terminal(mut self, fallback_file: Option<PathBuf>) -> Self {
        if self.file.is_none() && self.level > LogLevel::Warn {
            match fallback_file {
                Some(path) => self.file = Some(path),
                None => self.level = LogLevel::Warn,
            }
        }
        self
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to open log file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to configure logger: {0}")]
    Configure(String),
}

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(config: &LogConfig) -> Result<(), InitError> {
    if GUARD.get().is_some() {
        return Ok(());
    }

    let custom = std::env::var("PANEL_LOG_FILTER").ok();
    let quiet_deps =
        custom.is_none() && config.level == LogLevel::Trace && !trace_deps_requested();
    let filter = custom.unwrap_or_else(|| default_filter(config.level, quiet_deps));

    let (writer, guard) = open_writer(config)?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(config.level >= LogLevel::Debug)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| InitError::Configure(err.to_string()))?;
    let _ = GUARD.set(guard);

    if quiet_deps {
        tracing::info!(
            target: "panel::console",
            "dependency traces capped at info; set PANEL_TRACE_DEPS=1 or PANEL_LOG_FILTER to override"
        );
    }
    Ok(())
}

fn open_writer(config: &LogConfig) -> Result<(NonBlocking, WorkerGuard), InitError> {
    let Some(path) = &config.file else {
        return Ok(tracing_appender::non_blocking(io::stderr()));
    };
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| InitError::Io {
            path: path.clone(),
            source,
        })?;
    Ok(tracing_appender::non_blocking(file))
}

fn trace_deps_requested() -> bool {
    std::env::var("PANEL_TRACE_DEPS").is_ok_and(|value| !value.is_empty() && value != "0")
}

fn default_filter(level: LogLevel, quiet_deps: bool) -> String {
    let level = LevelFilter::from(level);
    let mut filter = if level >= LevelFilter::DEBUG {
        format!("info,panel={level},panel_stream={level},panel_console={level}")
    } else {
        level.to_string()
    };
    if quiet_deps {
        for target in NOISY_DEPENDENCIES {
            filter.push_str(&format!(",{target}=info"));
        }
    }
    filter.to_ascii_lowercase()
}
