//! Persistent export tracker.
//!
//! System of record for which clips have been exported. Workers consult it
//! before contacting the server and write every state transition through it,
//! so a re-run never repeats a successful export. Also keeps running counters
//! and a bounded log of recent activity for the `status` command.

pub mod error;
pub mod store;
pub mod types;

pub use error::TrackerError;
pub use store::{JsonTracker, Tracker, TRACKER_FILE};
pub use types::{
    ClipIdentity, ExportStatus, RecordFields, TrackerCounters, TrackerSummary,
};
