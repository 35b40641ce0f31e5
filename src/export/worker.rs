//! Per-clip export state machine.
//!
//! `CheckDedup -> (Skip | Enqueue) -> Polling -> Download -> (Success | Error)`.
//! Every terminal state is written to the tracker. Clip-level failures end as
//! a `failed` [`ClipResult`]; only a tracker write failure escapes as `Err`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;

use super::error::ClipError;
use super::file::{download_export, set_file_mtime};
use super::observer::ExportObserver;
use super::paths::clean_filename;
use crate::nvr::{locator_file_name, ClipDescriptor, ExportOptions, ExportState, NvrClient};
use crate::retry::RetryConfig;
use crate::tracker::{ClipIdentity, ExportStatus, RecordFields, Tracker, TrackerError};

pub const REASON_DEDUPE: &str = "dedupe_success";
pub const REASON_QUEUED: &str = "queued";

/// Knobs for a single clip's lifecycle.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub options: ExportOptions,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    pub download_retry: RetryConfig,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            options: ExportOptions::default(),
            poll_interval: Duration::from_secs(2),
            poll_attempts: 300,
            download_retry: RetryConfig::default(),
        }
    }
}

/// Terminal outcome of one clip, handed back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipResult {
    pub camera: String,
    pub clip: String,
    pub status: ExportStatus,
    pub file: Option<PathBuf>,
    pub error: Option<String>,
    pub reason: Option<String>,
}

impl ClipResult {
    pub fn success(identity: &ClipIdentity, file: PathBuf) -> Self {
        Self {
            camera: identity.camera.clone(),
            clip: identity.clip_path.clone(),
            status: ExportStatus::Success,
            file: Some(file),
            error: None,
            reason: None,
        }
    }

    pub fn skipped(identity: &ClipIdentity, reason: &str) -> Self {
        Self {
            camera: identity.camera.clone(),
            clip: identity.clip_path.clone(),
            status: ExportStatus::Skipped,
            file: None,
            error: None,
            reason: Some(reason.to_string()),
        }
    }

    pub fn failed(identity: &ClipIdentity, error: String) -> Self {
        Self {
            camera: identity.camera.clone(),
            clip: identity.clip_path.clone(),
            status: ExportStatus::Failed,
            file: None,
            error: Some(error),
            reason: None,
        }
    }
}

/// Shared collaborators for every worker of a run.
#[derive(Clone, Copy)]
pub struct WorkerContext<'a> {
    pub client: &'a dyn NvrClient,
    pub tracker: &'a dyn Tracker,
    pub observer: &'a dyn ExportObserver,
    pub settings: &'a WorkerSettings,
}

enum StepError {
    Clip(ClipError),
    Tracker(TrackerError),
}

impl From<ClipError> for StepError {
    fn from(e: ClipError) -> Self {
        Self::Clip(e)
    }
}

impl From<TrackerError> for StepError {
    fn from(e: TrackerError) -> Self {
        Self::Tracker(e)
    }
}

struct Exported {
    export_id: String,
    locator: String,
    filename: String,
    path: PathBuf,
    filesize_bytes: u64,
}

/// Drive one clip to a terminal state.
pub async fn export_clip(
    ctx: WorkerContext<'_>,
    camera: &str,
    clip: &ClipDescriptor,
    target_dir: &Path,
) -> Result<ClipResult, TrackerError> {
    let identity = ClipIdentity::new(camera, &clip.path);

    if ctx.tracker.has_succeeded(&identity).await? {
        ctx.tracker
            .record(
                &identity,
                ExportStatus::Skipped,
                RecordFields {
                    reason: Some(REASON_DEDUPE.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        return Ok(ClipResult::skipped(&identity, REASON_DEDUPE));
    }

    let started = Utc::now().timestamp();
    match run(ctx, &identity, clip, target_dir, started).await {
        Ok(done) => {
            ctx.tracker
                .record(
                    &identity,
                    ExportStatus::Success,
                    RecordFields {
                        export_id: Some(done.export_id),
                        filename: Some(done.filename),
                        uri: Some(done.locator),
                        filesize_bytes: Some(done.filesize_bytes),
                        started_at_epoch: Some(started),
                        finished_at_epoch: Some(Utc::now().timestamp()),
                        ..Default::default()
                    },
                )
                .await?;
            Ok(ClipResult::success(&identity, done.path))
        }
        Err(StepError::Clip(e)) => {
            let message = e.to_string();
            ctx.tracker
                .record(
                    &identity,
                    ExportStatus::Failed,
                    RecordFields {
                        error: Some(message.clone()),
                        started_at_epoch: Some(started),
                        finished_at_epoch: Some(Utc::now().timestamp()),
                        ..Default::default()
                    },
                )
                .await?;
            Ok(ClipResult::failed(&identity, message))
        }
        Err(StepError::Tracker(e)) => Err(e),
    }
}

async fn run(
    ctx: WorkerContext<'_>,
    identity: &ClipIdentity,
    clip: &ClipDescriptor,
    target_dir: &Path,
    started: i64,
) -> Result<Exported, StepError> {
    let ticket = ctx
        .client
        .enqueue_export(&clip.path, &ctx.settings.options)
        .await
        .map_err(ClipError::Enqueue)?;

    ctx.tracker
        .record(
            identity,
            ExportStatus::InProgress,
            RecordFields {
                export_id: Some(ticket.job_id.clone()),
                reason: Some(REASON_QUEUED.to_string()),
                started_at_epoch: Some(started),
                ..Default::default()
            },
        )
        .await?;
    ctx.observer.clip_queued(identity, &ticket.job_id);

    let (locator, reported_size) = poll_until_done(ctx, &ticket.job_id).await?;

    let filename = clean_filename(locator_file_name(&locator));
    if filename.is_empty() {
        return Err(ClipError::BadLocation(locator).into());
    }
    let path = target_dir.join(&filename);
    tracing::debug!(
        camera = %identity.camera,
        clip = %identity.clip_path,
        path = %path.display(),
        "Downloading export"
    );
    let written =
        download_export(ctx.client, &locator, &path, &ctx.settings.download_retry).await?;

    if clip.recorded_at_epoch > 0 {
        let mtime_path = path.clone();
        let ts = clip.recorded_at_epoch;
        match tokio::task::spawn_blocking(move || set_file_mtime(&mtime_path, ts)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not set mtime")
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "mtime task failed"),
        }
    }

    Ok(Exported {
        export_id: ticket.job_id,
        locator,
        filename,
        path,
        filesize_bytes: reported_size.unwrap_or(written),
    })
}

/// Poll at a fixed interval until the job is done, errors, or the attempt
/// budget runs out. Returns the download locator and server-reported size.
async fn poll_until_done(
    ctx: WorkerContext<'_>,
    job_id: &str,
) -> Result<(String, Option<u64>), ClipError> {
    let attempts = ctx.settings.poll_attempts;
    let mut last = ExportState::Queued;

    for attempt in 1..=attempts {
        let progress = ctx.client.export_status(job_id).await?;
        last = progress.state;
        match progress.state {
            ExportState::Done => {
                return match progress.locator.filter(|l| !l.is_empty()) {
                    Some(locator) => Ok((locator, progress.filesize_bytes)),
                    None => Err(ClipError::NoLocation),
                };
            }
            ExportState::Error => {
                let message = progress
                    .error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "Unknown export error".to_string());
                return Err(ClipError::ServerReported(message));
            }
            ExportState::Queued | ExportState::Processing => {}
        }
        if attempt < attempts {
            tokio::time::sleep(ctx.settings.poll_interval).await;
        }
    }

    Err(ClipError::PollTimeout {
        last: last.as_str(),
    })
}
