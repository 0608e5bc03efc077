use clap::{Args, Parser, Subcommand};
use panel_stream::LogCategory;
use std::path::PathBuf;

use crate::telemetry::{LogConfig, LogLevel};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

#[derive(Parser, Debug)]
#[command(
    name = "panel-console",
    about = "Remote shell and live logs for the hosting panel",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "PANEL_API_URL",
        default_value = DEFAULT_API_URL,
        help = "Base URL of the panel API; stream endpoints are derived from it"
    )]
    pub api_url: String,

    #[arg(
        long,
        global = true,
        env = "PANEL_TOKEN",
        hide_env_values = true,
        value_name = "TOKEN",
        help = "Access token; read from the token file when omitted"
    )]
    pub token: Option<String>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        global = true,
        env = "PANEL_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        global = true,
        env = "PANEL_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open an interactive shell, globally or in a site's directory
    Shell(ShellArgs),
    /// Tail a site's application or webserver log
    Logs(LogsArgs),
    /// List the sites visible to this token
    Sites,
}

#[derive(Args, Debug, Default)]
pub struct ShellArgs {
    #[arg(long, value_name = "SITE_ID", help = "Root the shell in this site's directory")]
    pub site: Option<String>,
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    #[arg(
        long,
        value_name = "DOMAIN",
        help = "Site to tail; defaults to the first site the API returns"
    )]
    pub site: Option<String>,

    #[arg(
        long,
        short = 'c',
        default_value = "application",
        help = "Log category (application, webserver)"
    )]
    pub category: LogCategory,

    #[arg(long, short = 'f', help = "Start streaming immediately")]
    pub follow: bool,
}
