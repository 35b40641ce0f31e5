//! Tracker trait and the JSON-file implementation.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use fs4::fs_std::FileExt;
use tokio::sync::Mutex;

use super::error::TrackerError;
use super::types::{
    ClipIdentity, ExportStatus, RecordFields, TrackerEvent, TrackerRecord, TrackerState,
    MAX_EVENTS,
};

pub const TRACKER_FILE: &str = ".export_tracker.json";
const TMP_FILE: &str = ".export_tracker.tmp";
const BACKUP_FILE: &str = ".export_tracker.json.bak";
const LOCK_FILE: &str = ".export_tracker.lock";

/// Durable record of per-clip export outcomes.
///
/// This trait is object-safe and is shared between workers as
/// `Arc<dyn Tracker>`.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// True when a `success` record exists for the identity.
    async fn has_succeeded(&self, identity: &ClipIdentity) -> Result<bool, TrackerError>;

    /// Upsert the clip's record, bump counters, append an event and persist.
    /// `InProgress` writes are logged and stored but leave the counters alone.
    ///
    /// Fields present in `fields` overwrite the stored ones; absent fields are
    /// kept. Returns only once the new state is on disk.
    async fn record(
        &self,
        identity: &ClipIdentity,
        status: ExportStatus,
        fields: RecordFields,
    ) -> Result<(), TrackerError>;

    /// Deep copy of the current state.
    async fn snapshot(&self) -> Result<TrackerState, TrackerError>;
}

/// Tracker stored as a single pretty-printed JSON document under the export
/// root, rewritten atomically after every mutation.
pub struct JsonTracker {
    state: Mutex<TrackerState>,
    path: PathBuf,
    tmp_path: PathBuf,
    /// Held for the tracker's lifetime; the OS lock is released on drop.
    _lock: File,
}

impl std::fmt::Debug for JsonTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonTracker")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JsonTracker {
    /// Open (or start) the tracker in `export_root`, taking the process lock.
    ///
    /// A leftover temp file from an interrupted write is removed. A tracker
    /// file that cannot be read or parsed is moved aside to a backup and an
    /// empty state is used instead.
    pub fn open(export_root: &Path) -> Result<Self, TrackerError> {
        fs::create_dir_all(export_root).map_err(|e| TrackerError::io(export_root, e))?;

        let lock_path = export_root.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| TrackerError::io(&lock_path, e))?;
        lock.try_lock_exclusive().map_err(|e| {
            if e.kind() == io::ErrorKind::WouldBlock {
                TrackerError::Locked(lock_path.clone())
            } else {
                TrackerError::io(&lock_path, e)
            }
        })?;

        let path = export_root.join(TRACKER_FILE);
        let tmp_path = export_root.join(TMP_FILE);

        match fs::remove_file(&tmp_path) {
            Ok(()) => tracing::warn!(
                path = %tmp_path.display(),
                "Removed incomplete tracker write from a previous run"
            ),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(TrackerError::io(&tmp_path, e)),
        }

        let state = load_or_recover(&path, export_root)?;
        tracing::debug!(
            path = %path.display(),
            clips = state.clips.len(),
            "Tracker loaded"
        );

        Ok(Self {
            state: Mutex::new(state),
            path,
            tmp_path,
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the tracker under `export_root` for reading only.
    ///
    /// Takes no lock and performs no recovery, so it is safe while an export
    /// holds the tracker. `None` when no tracker file exists yet; a damaged
    /// file is an error and is left in place.
    pub fn read_snapshot(export_root: &Path) -> Result<Option<TrackerState>, TrackerError> {
        let path = export_root.join(TRACKER_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TrackerError::io(&path, e)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Write `state` to disk on the blocking pool: temp file, fsync, rename.
    async fn persist(&self, state: &TrackerState) -> Result<(), TrackerError> {
        // Round-trip through Value so object keys come out sorted.
        let value = serde_json::to_value(state)?;
        let mut bytes = serde_json::to_vec_pretty(&value)?;
        bytes.push(b'\n');

        let tmp_path = self.tmp_path.clone();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&tmp_path, &path, &bytes)).await?
    }
}

fn write_atomically(tmp_path: &Path, path: &Path, bytes: &[u8]) -> Result<(), TrackerError> {
    let mut file = File::create(tmp_path).map_err(|e| TrackerError::io(tmp_path, e))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| TrackerError::io(tmp_path, e))?;
    drop(file);
    fs::rename(tmp_path, path).map_err(|e| TrackerError::io(path, e))
}

fn load_or_recover(path: &Path, export_root: &Path) -> Result<TrackerState, TrackerError> {
    let now = Utc::now().timestamp();
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TrackerState::empty(now)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Tracker file unreadable");
            backup_corrupt(path, export_root)?;
            return Ok(TrackerState::empty(now));
        }
    };

    match serde_json::from_slice::<TrackerState>(&bytes) {
        Ok(state) => Ok(state),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Tracker file corrupt");
            backup_corrupt(path, export_root)?;
            Ok(TrackerState::empty(now))
        }
    }
}

/// Move a damaged tracker aside without clobbering an earlier backup.
fn backup_corrupt(path: &Path, export_root: &Path) -> Result<PathBuf, TrackerError> {
    let mut backup = export_root.join(BACKUP_FILE);
    if backup.exists() {
        backup = export_root.join(format!(
            "{}.{}.bak",
            TRACKER_FILE,
            Utc::now().timestamp_millis()
        ));
    }
    fs::rename(path, &backup).map_err(|e| TrackerError::io(path, e))?;
    tracing::warn!(
        backup = %backup.display(),
        "Moved corrupt tracker aside, starting with an empty one"
    );
    Ok(backup)
}

#[async_trait]
impl Tracker for JsonTracker {
    async fn has_succeeded(&self, identity: &ClipIdentity) -> Result<bool, TrackerError> {
        let state = self.state.lock().await;
        Ok(state
            .clips
            .get(&identity.key())
            .is_some_and(|r| r.status == ExportStatus::Success))
    }

    async fn record(
        &self,
        identity: &ClipIdentity,
        status: ExportStatus,
        fields: RecordFields,
    ) -> Result<(), TrackerError> {
        let now = Utc::now().timestamp();
        let event = TrackerEvent {
            timestamp_epoch: now,
            camera: identity.camera.clone(),
            clip: identity.clip_path.clone(),
            status,
            filename: fields.filename.clone(),
            export_id: fields.export_id.clone(),
            error: fields.error.clone(),
        };

        let mut state = self.state.lock().await;
        // Mutate a copy so a failed write leaves memory matching disk.
        let mut next = state.clone();

        match next.clips.get_mut(&identity.key()) {
            // A success record is final; later writes only count and log.
            Some(existing) if existing.status == ExportStatus::Success => {}
            Some(existing) => {
                existing.status = status;
                existing.updated_at_epoch = now;
                existing.fields.merge_from(fields);
            }
            None => {
                next.clips.insert(
                    identity.key(),
                    TrackerRecord {
                        camera: identity.camera.clone(),
                        clip: identity.clip_path.clone(),
                        status,
                        updated_at_epoch: now,
                        fields,
                        extra: Default::default(),
                    },
                );
            }
        }

        next.counters.bump(status);
        next.per_camera
            .entry(identity.camera.clone())
            .or_default()
            .bump(status);

        next.events.push(event);
        if next.events.len() > MAX_EVENTS {
            let excess = next.events.len() - MAX_EVENTS;
            next.events.drain(..excess);
        }
        next.updated_at_epoch = now;

        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    async fn snapshot(&self) -> Result<TrackerState, TrackerError> {
        Ok(self.state.lock().await.clone())
    }
}
