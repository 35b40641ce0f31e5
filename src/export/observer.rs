//! Progress reporting hooks for the export pipeline.

use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::worker::ClipResult;
use crate::schedule::ExportJob;
use crate::tracker::{ClipIdentity, ExportStatus};

/// Receives lifecycle notifications from the orchestrator and its workers.
///
/// Called concurrently from every in-flight worker; implementations must not
/// block for long.
pub trait ExportObserver: Send + Sync {
    fn job_started(&self, job: &ExportJob, clip_count: usize);

    /// The job could not be run at all (bad window, listing failure).
    fn job_failed(&self, job: &ExportJob, error: &str);

    fn clip_queued(&self, identity: &ClipIdentity, job_id: &str);

    fn clip_finished(&self, result: &ClipResult);

    fn job_finished(&self, job: &ExportJob, results: &[ClipResult]);
}

/// Structured `tracing` output, one line per transition.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ExportObserver for TracingObserver {
    fn job_started(&self, job: &ExportJob, clip_count: usize) {
        if clip_count == 0 {
            tracing::warn!(camera = %job.camera, date = %job.date, "No clips found");
        } else {
            tracing::info!(
                camera = %job.camera,
                date = %job.date,
                clips = clip_count,
                "Found clips"
            );
        }
    }

    fn job_failed(&self, job: &ExportJob, error: &str) {
        tracing::error!(camera = %job.camera, date = %job.date, error, "Job failed");
    }

    fn clip_queued(&self, identity: &ClipIdentity, job_id: &str) {
        tracing::info!(
            camera = %identity.camera,
            clip = %identity.clip_path,
            export_id = job_id,
            "Export queued"
        );
    }

    fn clip_finished(&self, result: &ClipResult) {
        match result.status {
            ExportStatus::Success => tracing::info!(
                camera = %result.camera,
                clip = %result.clip,
                file = %result.file.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
                "Saved"
            ),
            ExportStatus::Skipped => tracing::info!(
                camera = %result.camera,
                clip = %result.clip,
                reason = result.reason.as_deref().unwrap_or(""),
                "Skipped (already exported)"
            ),
            ExportStatus::Failed | ExportStatus::InProgress => tracing::error!(
                camera = %result.camera,
                clip = %result.clip,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Export failed"
            ),
        }
    }

    fn job_finished(&self, job: &ExportJob, results: &[ClipResult]) {
        tracing::debug!(
            camera = %job.camera,
            date = %job.date,
            results = results.len(),
            "Job finished"
        );
    }
}

/// Progress bar over all clips of the run. Log lines from the wrapped
/// [`TracingObserver`] are printed with the bar suspended.
pub struct ProgressObserver {
    pb: ProgressBar,
    inner: TracingObserver,
}

impl ProgressObserver {
    /// A hidden bar is used when `no_progress_bar` is set or stdout is not a
    /// terminal (cron, pipes).
    pub fn new(no_progress_bar: bool) -> Self {
        let pb = if no_progress_bar || !std::io::stdout().is_terminal() {
            // Hidden, but still tracking length so totals stay correct.
            ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden())
        } else {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            ) {
                pb.set_style(style.progress_chars("=> "));
            }
            pb
        };
        Self {
            pb,
            inner: TracingObserver,
        }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl ExportObserver for ProgressObserver {
    fn job_started(&self, job: &ExportJob, clip_count: usize) {
        self.pb.inc_length(clip_count as u64);
        self.pb.set_message(format!("{} {}", job.camera, job.date));
        self.pb.suspend(|| self.inner.job_started(job, clip_count));
    }

    fn job_failed(&self, job: &ExportJob, error: &str) {
        self.pb.suspend(|| self.inner.job_failed(job, error));
    }

    fn clip_queued(&self, identity: &ClipIdentity, job_id: &str) {
        self.pb.suspend(|| self.inner.clip_queued(identity, job_id));
    }

    fn clip_finished(&self, result: &ClipResult) {
        self.pb.suspend(|| self.inner.clip_finished(result));
        self.pb.inc(1);
    }

    fn job_finished(&self, job: &ExportJob, results: &[ClipResult]) {
        self.inner.job_finished(job, results);
    }
}
