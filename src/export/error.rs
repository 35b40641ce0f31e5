use thiserror::Error;

use crate::nvr::NvrError;

/// Why a single clip's export ended in the failed state.
///
/// The display text is what lands in the tracker's `error` field and the run
/// summary, so it is kept close to the server's own wording.
#[derive(Debug, Error)]
pub enum ClipError {
    /// The server refused to queue the export.
    #[error("{0}")]
    Enqueue(NvrError),

    /// The export job reported `error`.
    #[error("{0}")]
    ServerReported(String),

    #[error("Export completed but no location returned")]
    NoLocation,

    #[error("Export did not reach done status (last={last})")]
    PollTimeout { last: &'static str },

    /// The locator did not yield a usable file name.
    #[error("Export location '{0}' has no file name")]
    BadLocation(String),

    #[error("Download failed: {0}")]
    Download(NvrError),

    #[error("Failed to write {path}: {source}")]
    Disk {
        path: String,
        source: std::io::Error,
    },

    /// Transport or protocol failure while polling.
    #[error(transparent)]
    Nvr(#[from] NvrError),
}
