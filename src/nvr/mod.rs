//! NVR client capability: the four remote operations the exporter relies on
//! (list, enqueue, status, download), plus camera listing for the CLI.
//!
//! The orchestrator only sees the [`NvrClient`] trait; [`BlueIrisClient`] is
//! the HTTP implementation.

pub mod client;
pub mod error;
pub mod responses;

pub use client::BlueIrisClient;
pub use error::NvrError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

/// A recorded clip as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipDescriptor {
    pub path: String,
    pub recorded_at_epoch: i64,
    pub duration_ms: u64,
    pub resolution: Option<String>,
}

/// A physical camera known to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    pub short_name: String,
    pub display_name: String,
    pub ip: String,
    pub is_enabled: bool,
    pub is_online: bool,
}

/// Output container requested from the server's converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Avi,
    #[default]
    Mp4,
}

impl ExportFormat {
    /// Numeric selector used by the `export` command.
    pub fn code(self) -> u8 {
        match self {
            ExportFormat::Avi => 0,
            ExportFormat::Mp4 => 1,
        }
    }
}

/// Transcode parameters sent with every export request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub reencode: bool,
    pub overlay: bool,
    pub audio: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Mp4,
            reencode: true,
            overlay: false,
            audio: true,
        }
    }
}

/// Server acknowledgement of an enqueued export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTicket {
    pub job_id: String,
    pub locator: Option<String>,
}

/// Lifecycle state of a server-side export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Queued,
    Processing,
    Done,
    Error,
}

impl ExportState {
    pub fn from_label(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "done" => Self::Done,
            "error" => Self::Error,
            "queued" | "pending" | "" => Self::Queued,
            _ => Self::Processing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

/// One status poll result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportProgress {
    pub state: ExportState,
    pub locator: Option<String>,
    pub error: Option<String>,
    pub filesize_bytes: Option<u64>,
}

/// Final path segment of a download locator. The server hands back
/// Windows-style paths such as `Clipboard\front.2026-01-10.mp4`.
pub fn locator_file_name(locator: &str) -> &str {
    locator
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(locator)
}

/// Remote operations consumed by the export pipeline.
///
/// Implementations must be safe to share across concurrent workers; session
/// refresh, if any, is the implementation's concern. Every method is expected
/// to be bounded by a request timeout.
#[async_trait]
pub trait NvrClient: Send + Sync {
    async fn list_clips(
        &self,
        camera: &str,
        start_epoch: i64,
        end_epoch: i64,
    ) -> Result<Vec<ClipDescriptor>, NvrError>;

    async fn enqueue_export(
        &self,
        clip_path: &str,
        options: &ExportOptions,
    ) -> Result<ExportTicket, NvrError>;

    async fn export_status(&self, job_id: &str) -> Result<ExportProgress, NvrError>;

    /// Stream the exported file at `locator` into `sink`, returning the number
    /// of bytes written. Reports [`NvrError::NotReady`] while the file is not
    /// yet published; retrying is the caller's job.
    async fn download(
        &self,
        locator: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, NvrError>;

    async fn list_cameras(&self) -> Result<Vec<CameraInfo>, NvrError>;
}
