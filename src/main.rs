//! bi-export: bulk clip exporter for Blue Iris NVR servers.
//!
//! Lists recorded clips per camera and local time window, asks the server to
//! convert each one, polls until the export is ready and downloads it into a
//! `<root>/<camera>/<date>/` tree. A JSON tracker under the export root makes
//! re-runs skip clips that were already exported.

#![warn(clippy::all)]

mod cli;
mod config;
mod export;
mod nvr;
pub mod retry;
mod schedule;
mod shutdown;
mod tracker;
mod types;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use chrono::DateTime;
use chrono_tz::Tz;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Command, ListClipsArgs, StatusArgs};
use config::Config;
use export::{paths, Orchestrator, ProgressObserver};
use nvr::{BlueIrisClient, NvrClient};
use schedule::{DailyWindow, ExportJob};
use tracker::{JsonTracker, TrackerCounters, TrackerSummary, TRACKER_FILE};

/// Password precedence: `--password` / `BI_PASSWORD`, then the config file,
/// then an interactive prompt.
fn resolve_password(cli_password: Option<String>, config: &Config) -> anyhow::Result<String> {
    if let Some(pw) = cli_password.or_else(|| config.password.clone()) {
        return Ok(pw);
    }
    let prompt = format!("Blue Iris password for {}: ", config.username);
    tokio::task::block_in_place(|| rpassword::prompt_password(prompt))
        .context("Failed to read password")
}

fn build_client(config: &Config, cli_password: Option<String>) -> anyhow::Result<BlueIrisClient> {
    let password = resolve_password(cli_password, config)?;
    BlueIrisClient::new(&config.host, &config.username, &password, config.timeout)
        .context("Failed to build HTTP client")
}

/// Run the export command.
async fn run_export(cli: &cli::Cli, config: Config) -> anyhow::Result<()> {
    if config.jobs.is_empty() {
        tracing::warn!("No jobs configured, nothing to export");
        return Ok(());
    }

    let client = build_client(&config, cli.password.clone())?;
    let tracker = JsonTracker::open(&config.export_root).with_context(|| {
        format!(
            "Failed to open export tracker under {}",
            config.export_root.display()
        )
    })?;
    tracing::info!(
        tracker = %tracker.path().display(),
        jobs = config.jobs.len(),
        workers = config.workers,
        "Starting bi-export"
    );

    let shutdown_token =
        shutdown::install_signal_handler().context("Failed to install signal handlers")?;
    let observer = Arc::new(ProgressObserver::new(cli.no_progress_bar));
    let orchestrator = Orchestrator::new(
        Arc::new(client),
        Arc::new(tracker),
        observer.clone(),
        config.export_settings(),
        shutdown_token,
    );

    let started = Instant::now();
    let result = orchestrator.export_jobs(&config.jobs).await;
    observer.finish();
    let summary = result.context("Export tracker could not be persisted, run aborted")?;
    export::log_summary(&summary, started.elapsed());

    if summary.has_failures() {
        bail!(
            "{} clip export(s) and {} job(s) failed",
            summary.failures().count(),
            summary.failed_jobs.len()
        );
    }
    Ok(())
}

/// Run the list-cameras command.
async fn run_list_cameras(cli: &cli::Cli, config: &Config) -> anyhow::Result<()> {
    let client = build_client(config, cli.password.clone())?;
    let mut cameras = client.list_cameras().await?;
    cameras.sort_by(|a, b| a.short_name.cmp(&b.short_name));

    println!();
    println!("{:15} {:8} {:8} {:15} NAME", "SHORT NAME", "ENABLED", "ONLINE", "IP");
    println!("{}", "-".repeat(75));
    for cam in &cameras {
        println!(
            "{:15} {:8} {:8} {:15} {}",
            cam.short_name,
            yes_no(cam.is_enabled),
            yes_no(cam.is_online),
            cam.ip,
            cam.display_name
        );
    }
    println!();
    Ok(())
}

/// Run the list-clips command. The window is interpreted in the configured
/// timezone.
async fn run_list_clips(
    cli: &cli::Cli,
    config: &Config,
    args: &ListClipsArgs,
) -> anyhow::Result<()> {
    let job = ExportJob {
        camera: args.camera.clone(),
        date: args.date,
        window: DailyWindow {
            start: args.start,
            end: args.end,
        },
        timezone: config.timezone,
    };
    let (start_epoch, end_epoch) = job.epoch_window()?;

    let client = build_client(config, cli.password.clone())?;
    let clips = client
        .list_clips(&args.camera, start_epoch, end_epoch)
        .await?;
    if clips.is_empty() {
        println!("No clips found for {}", job);
        return Ok(());
    }

    println!();
    println!("Clips for {}:", job);
    println!();
    println!("{:20} {:19} {:10} RESOLUTION", "PATH", "START (LOCAL)", "DURATION");
    println!("{}", "-".repeat(75));
    for clip in &clips {
        println!(
            "{:20} {:19} {:10} {}",
            clip.path,
            format_local(clip.recorded_at_epoch, config.timezone),
            format_clip_length(clip.duration_ms),
            clip.resolution.as_deref().unwrap_or("N/A")
        );
    }
    println!();
    Ok(())
}

/// Run the init-cameras command.
async fn run_init_cameras(cli: &cli::Cli, config: &Config) -> anyhow::Result<()> {
    let client = build_client(config, cli.password.clone())?;
    let cameras: Vec<String> = client
        .list_cameras()
        .await?
        .into_iter()
        .map(|c| c.short_name)
        .collect();

    let created = paths::create_camera_dirs(&config.export_root, &cameras).with_context(|| {
        format!(
            "Failed to create camera folders under {}",
            config.export_root.display()
        )
    })?;
    println!("Created/verified {} camera directories:", created.len());
    for dir in &created {
        println!("  {}", dir.display());
    }
    Ok(())
}

/// Run the status command. Reads the tracker without locking it, so it
/// works while an export is running.
fn run_status(config: &Config, args: &StatusArgs) -> anyhow::Result<()> {
    let path = config.export_root.join(TRACKER_FILE);
    let Some(state) = JsonTracker::read_snapshot(&config.export_root)
        .with_context(|| format!("Failed to read {}", path.display()))?
    else {
        println!("No export tracker found at {}", path.display());
        println!("Run an export first to create it.");
        return Ok(());
    };
    let summary = TrackerSummary::from(&state);

    println!("Export tracker: {}", path.display());
    println!();
    println!("Clips tracked: {}", summary.records);
    print_counters("All cameras", &summary.counters);
    for (camera, counters) in &summary.per_camera {
        print_counters(camera, counters);
    }
    println!();
    println!(
        "Created: {}",
        format_local(summary.created_at_epoch, config.timezone)
    );
    println!(
        "Updated: {}",
        format_local(summary.updated_at_epoch, config.timezone)
    );

    if args.failed {
        let failed = state.failed_records();
        if !failed.is_empty() {
            println!();
            println!("Failed clips:");
            for record in failed {
                println!(
                    "  {} | {} | {}",
                    record.camera,
                    record.clip,
                    record.fields.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
    Ok(())
}

/// Run the schedule command.
fn run_schedule(config: &Config) {
    if config.jobs.is_empty() {
        println!("No jobs configured.");
        return;
    }
    println!("{} job(s):", config.jobs.len());
    for job in &config.jobs {
        match job.epoch_window() {
            Ok((start, end)) => println!("  {}  [{} .. {}]", job, start, end),
            Err(e) => println!("  {}  (invalid: {})", job, e),
        }
    }
}

fn print_counters(label: &str, counters: &TrackerCounters) {
    println!(
        "  {:20} success: {:6}  failed: {:6}  skipped: {:6}",
        label, counters.success, counters.failed, counters.skipped
    );
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Epoch seconds as local wall-clock time in `tz`.
fn format_local(epoch: i64, tz: Tz) -> String {
    DateTime::from_timestamp(epoch, 0)
        .map(|t| t.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Clip length as `HH:MM:SS`.
fn format_clip_length(duration_ms: u64) -> String {
    let total = duration_ms / 1000;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let config = Config::load(&config::expand_tilde(&cli.config))?;
    tracing::debug!(?config, "Loaded configuration");

    match cli.effective_command() {
        Command::Export => run_export(&cli, config).await,
        Command::ListCameras => run_list_cameras(&cli, &config).await,
        Command::ListClips(args) => run_list_clips(&cli, &config, &args).await,
        Command::InitCameras => run_init_cameras(&cli, &config).await,
        Command::Status(args) => run_status(&config, &args),
        Command::Schedule => {
            run_schedule(&config);
            Ok(())
        }
    }
}
