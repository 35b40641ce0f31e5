//! Error types for the export tracker.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the tracker store. Any of these means durability can no
/// longer be guaranteed, so callers treat them as fatal for the run.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Failed to create, write, or rename a tracker file.
    #[error("Tracker I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize the in-memory state.
    #[error("Failed to serialize tracker state: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Another process holds the tracker lock.
    #[error("Another bi-export instance is using {0} (lock held)")]
    Locked(PathBuf),

    /// The blocking write task panicked or was cancelled.
    #[error("Tracker write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl TrackerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
