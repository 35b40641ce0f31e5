//! In-memory NVR and observer doubles for pipeline tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::observer::ExportObserver;
use super::worker::ClipResult;
use crate::nvr::{
    locator_file_name, CameraInfo, ClipDescriptor, ExportOptions, ExportProgress, ExportState,
    ExportTicket, NvrClient, NvrError,
};
use crate::schedule::ExportJob;
use crate::tracker::ClipIdentity;

type ErrorFactory = Box<dyn Fn() -> NvrError + Send + Sync>;

pub fn clip(path: &str) -> ClipDescriptor {
    ClipDescriptor {
        path: path.to_string(),
        recorded_at_epoch: 1_768_089_600,
        duration_ms: 60_000,
        resolution: Some("1920x1080".into()),
    }
}

pub fn progress(state: ExportState, locator: Option<&str>) -> ExportProgress {
    ExportProgress {
        state,
        locator: locator.map(str::to_string),
        error: None,
        filesize_bytes: None,
    }
}

/// Scripted NVR. Status replies are scripted per clip path; the last entry of
/// a script repeats once it is exhausted, and unscripted clips stay
/// `processing` forever.
#[derive(Default)]
pub struct FakeNvr {
    clips: HashMap<String, Vec<ClipDescriptor>>,
    listing_failures: HashSet<String>,
    enqueue_failures: HashMap<String, ErrorFactory>,
    status_failure: Option<ErrorFactory>,
    scripts: Mutex<HashMap<String, VecDeque<ExportProgress>>>,
    jobs: Mutex<HashMap<String, String>>,
    files: HashMap<String, Vec<u8>>,
    not_ready_remaining: AtomicUsize,
    truncate: bool,
    status_delay: Duration,
    enqueued: Mutex<Vec<(String, ExportOptions)>>,
    enqueue_calls: AtomicUsize,
    status_calls: AtomicUsize,
    download_calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeNvr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clips(mut self, camera: &str, clips: Vec<ClipDescriptor>) -> Self {
        self.clips.insert(camera.to_string(), clips);
        self
    }

    pub fn fail_listing(mut self, camera: &str) -> Self {
        self.listing_failures.insert(camera.to_string());
        self
    }

    pub fn fail_enqueue(
        mut self,
        clip_path: &str,
        make: impl Fn() -> NvrError + Send + Sync + 'static,
    ) -> Self {
        self.enqueue_failures
            .insert(clip_path.to_string(), Box::new(make));
        self
    }

    pub fn fail_status(mut self, make: impl Fn() -> NvrError + Send + Sync + 'static) -> Self {
        self.status_failure = Some(Box::new(make));
        self
    }

    pub fn with_status_script(self, clip_path: &str, script: Vec<ExportProgress>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(clip_path.to_string(), script.into());
        self
    }

    pub fn with_file(mut self, name: &str, bytes: &[u8]) -> Self {
        self.files.insert(name.to_string(), bytes.to_vec());
        self
    }

    /// The first `n` download calls report "not ready".
    pub fn not_ready_for(self, n: usize) -> Self {
        self.not_ready_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Downloads write half the body then fail.
    pub fn truncate_downloads(mut self) -> Self {
        self.truncate = true;
        self
    }

    /// Each status call holds its slot for `delay`, so overlap is observable.
    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    pub fn enqueue_calls(&self) -> usize {
        self.enqueue_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    /// Highest number of status calls that were in flight at once.
    pub fn max_concurrent_status(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn enqueued(&self) -> Vec<(String, ExportOptions)> {
        self.enqueued.lock().unwrap().clone()
    }
}

#[async_trait]
impl NvrClient for FakeNvr {
    async fn list_clips(
        &self,
        camera: &str,
        _start_epoch: i64,
        _end_epoch: i64,
    ) -> Result<Vec<ClipDescriptor>, NvrError> {
        if self.listing_failures.contains(camera) {
            return Err(NvrError::Api {
                cmd: "cliplist".into(),
                detail: format!("unknown camera {camera}"),
            });
        }
        Ok(self.clips.get(camera).cloned().unwrap_or_default())
    }

    async fn enqueue_export(
        &self,
        clip_path: &str,
        options: &ExportOptions,
    ) -> Result<ExportTicket, NvrError> {
        self.enqueue_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(make) = self.enqueue_failures.get(clip_path) {
            return Err(make());
        }
        let mut jobs = self.jobs.lock().unwrap();
        let job_id = format!("E{}", jobs.len() + 1);
        jobs.insert(job_id.clone(), clip_path.to_string());
        self.enqueued
            .lock()
            .unwrap()
            .push((clip_path.to_string(), *options));
        Ok(ExportTicket {
            job_id,
            locator: None,
        })
    }

    async fn export_status(&self, job_id: &str) -> Result<ExportProgress, NvrError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(make) = &self.status_failure {
            return Err(make());
        }
        let clip_path = self.jobs.lock().unwrap().get(job_id).cloned();
        let mut scripts = self.scripts.lock().unwrap();
        let next = clip_path
            .and_then(|p| scripts.get_mut(&p))
            .and_then(|script| {
                if script.len() > 1 {
                    script.pop_front()
                } else {
                    script.front().cloned()
                }
            });
        Ok(next.unwrap_or_else(|| progress(ExportState::Processing, None)))
    }

    async fn download(
        &self,
        locator: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, NvrError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.not_ready_remaining.load(Ordering::SeqCst);
        if pending > 0 {
            self.not_ready_remaining.store(pending - 1, Ordering::SeqCst);
            return Err(NvrError::NotReady { status: 503 });
        }
        let name = locator_file_name(locator);
        let bytes = self
            .files
            .get(name)
            .ok_or_else(|| NvrError::HttpStatus {
                status: 404,
                body: format!("no file {name}"),
            })?;
        if self.truncate {
            sink.write_all(&bytes[..bytes.len() / 2]).await?;
            return Err(NvrError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-body",
            )));
        }
        sink.write_all(bytes).await?;
        Ok(bytes.len() as u64)
    }

    async fn list_cameras(&self) -> Result<Vec<CameraInfo>, NvrError> {
        Ok(Vec::new())
    }
}

/// Records every notification for later assertions.
#[derive(Default)]
pub struct CapturingObserver {
    events: Mutex<Vec<String>>,
    queued: Mutex<Vec<String>>,
    finished: Mutex<Vec<ClipResult>>,
}

impl CapturingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn queued(&self) -> Vec<String> {
        self.queued.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<ClipResult> {
        self.finished.lock().unwrap().clone()
    }
}

impl ExportObserver for CapturingObserver {
    fn job_started(&self, job: &ExportJob, clip_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("start {} {}", job.camera, clip_count));
    }

    fn job_failed(&self, job: &ExportJob, error: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("failed {} {}", job.camera, error));
    }

    fn clip_queued(&self, _identity: &ClipIdentity, job_id: &str) {
        self.queued.lock().unwrap().push(job_id.to_string());
    }

    fn clip_finished(&self, result: &ClipResult) {
        self.finished.lock().unwrap().push(result.clone());
    }

    fn job_finished(&self, job: &ExportJob, results: &[ClipResult]) {
        self.events
            .lock()
            .unwrap()
            .push(format!("finish {} {}", job.camera, results.len()));
    }
}
