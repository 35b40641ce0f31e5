use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "bi-export",
    version,
    about = "Bulk-export recorded clips from a Blue Iris server"
)]
pub struct Cli {
    /// Path to the YAML job configuration
    #[arg(short = 'c', long, global = true, default_value = "config/export_jobs.yaml")]
    pub config: String,

    /// Server password (if not provided, read from config or prompted).
    /// WARNING: passing via --password is visible in process listings.
    /// Prefer the BI_PASSWORD environment variable instead.
    #[arg(short = 'p', long, global = true, env = "BI_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Log level (RUST_LOG overrides)
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Disable the progress bar
    #[arg(long, global = true)]
    pub no_progress_bar: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Bare invocation runs the configured exports.
    pub fn effective_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Export)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run every configured and scheduled export job (default)
    Export,

    /// List cameras known to the server
    ListCameras,

    /// List clips for one camera in a local time window
    ListClips(ListClipsArgs),

    /// Create a folder under the export root for every camera
    InitCameras,

    /// Show export tracker counters
    Status(StatusArgs),

    /// Print the jobs the configuration expands to, without exporting
    Schedule,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ListClipsArgs {
    /// Camera short name
    #[arg(long)]
    pub camera: String,

    /// Date (YYYY-MM-DD)
    #[arg(long)]
    pub date: NaiveDate,

    /// Window start (HH:MM:SS)
    #[arg(long, default_value = "00:00:00")]
    pub start: NaiveTime,

    /// Window end (HH:MM:SS)
    #[arg(long, default_value = "23:59:59")]
    pub end: NaiveTime,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct StatusArgs {
    /// List failed clips
    #[arg(long)]
    pub failed: bool,
}
