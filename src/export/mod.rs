//! Export orchestrator: runs jobs one after another and fans each job's
//! clips out over a bounded pool of workers.
//!
//! Jobs are sequential and every job drains its pool before the next one
//! starts, so the configured worker count is also the run-wide cap on exports
//! in flight against the server.

pub mod error;
pub mod file;
pub mod observer;
pub mod paths;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use observer::{ExportObserver, ProgressObserver};
pub use worker::{ClipResult, WorkerSettings};

use crate::nvr::{NvrClient, NvrError};
use crate::schedule::{ExportJob, ScheduleError};
use crate::tracker::{ExportStatus, Tracker, TrackerError};
use worker::WorkerContext;

/// Why a whole job produced no results.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Window(#[from] ScheduleError),

    #[error("Failed to list clips: {0}")]
    Listing(NvrError),

    #[error("Failed to create {path}: {source}")]
    Disk {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// Subset of application config consumed by the orchestrator.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub export_root: PathBuf,
    pub workers: usize,
    pub worker: WorkerSettings,
}

/// Aggregated outcome of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<ClipResult>,
    /// Jobs that could not be listed or resolved, with the reason.
    pub failed_jobs: Vec<(String, String)>,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn count(&self, status: ExportStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ClipResult> {
        self.results
            .iter()
            .filter(|r| r.status == ExportStatus::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.count(ExportStatus::Failed) > 0 || !self.failed_jobs.is_empty()
    }
}

pub struct Orchestrator {
    client: Arc<dyn NvrClient>,
    tracker: Arc<dyn Tracker>,
    observer: Arc<dyn ExportObserver>,
    settings: ExportSettings,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn NvrClient>,
        tracker: Arc<dyn Tracker>,
        observer: Arc<dyn ExportObserver>,
        settings: ExportSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            tracker,
            observer,
            settings,
            shutdown,
        }
    }

    /// Export every clip of one job. An empty listing returns no results and
    /// leaves the tracker and filesystem untouched.
    pub async fn export_job(&self, job: &ExportJob) -> Result<Vec<ClipResult>, JobError> {
        let (start_epoch, end_epoch) = job.epoch_window()?;
        tracing::info!(
            camera = %job.camera,
            date = %job.date,
            start_epoch,
            end_epoch,
            "Searching clips"
        );

        let clips = self
            .client
            .list_clips(&job.camera, start_epoch, end_epoch)
            .await
            .map_err(JobError::Listing)?;
        self.observer.job_started(job, clips.len());
        if clips.is_empty() {
            self.observer.job_finished(job, &[]);
            return Ok(Vec::new());
        }

        let target = paths::target_dir(&self.settings.export_root, &job.camera, job.date);
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|e| JobError::Disk {
                path: target.clone(),
                source: e,
            })?;

        let ctx = WorkerContext {
            client: self.client.as_ref(),
            tracker: self.tracker.as_ref(),
            observer: self.observer.as_ref(),
            settings: &self.settings.worker,
        };
        // Cancelled on shutdown, or locally once the tracker stops persisting.
        let stop = self.shutdown.child_token();
        let target = &target;
        let stop_ref = &stop;

        let outcomes: Vec<Result<ClipResult, TrackerError>> = stream::iter(clips.iter())
            .take_while(|_| std::future::ready(!stop_ref.is_cancelled()))
            .map(|clip| async move {
                let outcome = worker::export_clip(ctx, &job.camera, clip, target).await;
                match &outcome {
                    Ok(result) => ctx.observer.clip_finished(result),
                    Err(_) => stop_ref.cancel(),
                }
                outcome
            })
            .buffer_unordered(self.settings.workers.max(1))
            .collect()
            .await;

        let mut results = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            results.push(outcome?);
        }
        if results.len() < clips.len() {
            tracing::info!(
                camera = %job.camera,
                skipped = clips.len() - results.len(),
                "Shutdown requested, remaining clips not started"
            );
        }
        self.observer.job_finished(job, &results);
        Ok(results)
    }

    /// Run jobs in order. A job that cannot be listed is reported and skipped;
    /// a tracker failure aborts the run.
    pub async fn export_jobs(&self, jobs: &[ExportJob]) -> Result<RunSummary, TrackerError> {
        let mut summary = RunSummary::default();
        for job in jobs {
            if self.shutdown.is_cancelled() {
                break;
            }
            match self.export_job(job).await {
                Ok(results) => summary.results.extend(results),
                Err(JobError::Tracker(e)) => return Err(e),
                Err(e) => {
                    let message = e.to_string();
                    self.observer.job_failed(job, &message);
                    summary.failed_jobs.push((job.to_string(), message));
                }
            }
        }
        summary.interrupted = self.shutdown.is_cancelled();
        Ok(summary)
    }
}

/// Plain end-of-run report.
pub fn log_summary(summary: &RunSummary, elapsed: Duration) {
    tracing::info!("── Summary ──");
    tracing::info!("  Total clips processed: {}", summary.results.len());
    tracing::info!("  Successful exports:    {}", summary.count(ExportStatus::Success));
    tracing::info!("  Skipped (dedupe):      {}", summary.count(ExportStatus::Skipped));
    tracing::info!("  Failed exports:        {}", summary.count(ExportStatus::Failed));
    tracing::info!("  elapsed: {}", format_duration(elapsed));
    if summary.interrupted {
        tracing::warn!("  Interrupted by shutdown, some clips were not attempted");
    }

    if summary.has_failures() {
        tracing::info!("── Failures ──");
        for failure in summary.failures() {
            tracing::error!(
                "  {} | {} | {}",
                failure.camera,
                failure.clip,
                failure.error.as_deref().unwrap_or("unknown")
            );
        }
        for (job, error) in &summary.failed_jobs {
            tracing::error!("  {} | job | {}", job, error);
        }
    }
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
