//! Persisted shapes of the export tracker file.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Newest events kept in the rolling log.
pub const MAX_EVENTS: usize = 300;

/// Current on-disk format version.
pub const STATE_VERSION: u32 = 1;

/// Outcome label stored for a clip.
///
/// `InProgress` marks an export that was queued on the server but has not
/// reached a terminal state yet. It is visible in the file but never counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportStatus {
    Success,
    Failed,
    Skipped,
    InProgress,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::InProgress => "in_progress",
        }
    }

    /// Parse a status label. Anything unrecognised counts as a failure.
    pub fn from_label(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "skipped" => Self::Skipped,
            "in_progress" => Self::InProgress,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ExportStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExportStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label))
    }
}

/// A clip as identified by the tracker: camera short name plus the server's
/// clip path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClipIdentity {
    pub camera: String,
    pub clip_path: String,
}

impl ClipIdentity {
    pub fn new(camera: impl Into<String>, clip_path: impl Into<String>) -> Self {
        Self {
            camera: camera.into(),
            clip_path: clip_path.into(),
        }
    }

    /// Key used in the `clips` map.
    pub fn key(&self) -> String {
        format!("{}|{}", self.camera, self.clip_path)
    }
}

impl fmt::Display for ClipIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.camera, self.clip_path)
    }
}

/// Optional attributes attached to a `record` call. `None` leaves any
/// previously stored value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at_epoch: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at_epoch: Option<i64>,
}

impl RecordFields {
    /// Overlay every field present in `newer` onto `self`.
    pub fn merge_from(&mut self, newer: RecordFields) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.export_id, newer.export_id);
        take(&mut self.filename, newer.filename);
        take(&mut self.uri, newer.uri);
        take(&mut self.filesize_bytes, newer.filesize_bytes);
        take(&mut self.error, newer.error);
        take(&mut self.reason, newer.reason);
        take(&mut self.started_at_epoch, newer.started_at_epoch);
        take(&mut self.finished_at_epoch, newer.finished_at_epoch);
    }
}

/// Latest known state of one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerRecord {
    pub camera: String,
    pub clip: String,
    pub status: ExportStatus,
    #[serde(default)]
    pub updated_at_epoch: i64,
    #[serde(flatten)]
    pub fields: RecordFields,
    /// Keys written by other tools or older versions, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One entry of the rolling activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerEvent {
    pub timestamp_epoch: i64,
    pub camera: String,
    pub clip: String,
    pub status: ExportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerCounters {
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl TrackerCounters {
    pub fn bump(&mut self, status: ExportStatus) {
        match status {
            ExportStatus::Success => self.success += 1,
            ExportStatus::Failed => self.failed += 1,
            ExportStatus::Skipped => self.skipped += 1,
            ExportStatus::InProgress => {}
        }
    }

    pub fn total(&self) -> u64 {
        self.success + self.failed + self.skipped
    }
}

/// Full contents of the tracker file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub created_at_epoch: i64,
    #[serde(default)]
    pub updated_at_epoch: i64,
    #[serde(default)]
    pub clips: BTreeMap<String, TrackerRecord>,
    #[serde(default)]
    pub events: Vec<TrackerEvent>,
    #[serde(default)]
    pub counters: TrackerCounters,
    #[serde(default)]
    pub per_camera: BTreeMap<String, TrackerCounters>,
}

fn default_version() -> u32 {
    STATE_VERSION
}

impl TrackerState {
    pub fn empty(now_epoch: i64) -> Self {
        Self {
            version: STATE_VERSION,
            created_at_epoch: now_epoch,
            updated_at_epoch: now_epoch,
            clips: BTreeMap::new(),
            events: Vec::new(),
            counters: TrackerCounters::default(),
            per_camera: BTreeMap::new(),
        }
    }

    /// Records whose latest status is `failed`, oldest update first.
    pub fn failed_records(&self) -> Vec<TrackerRecord> {
        let mut failed: Vec<TrackerRecord> = self
            .clips
            .values()
            .filter(|r| r.status == ExportStatus::Failed)
            .cloned()
            .collect();
        failed.sort_by_key(|r| r.updated_at_epoch);
        failed
    }
}

/// Aggregate view used by the `status` command.
#[derive(Debug, Clone)]
pub struct TrackerSummary {
    pub records: usize,
    pub counters: TrackerCounters,
    pub per_camera: BTreeMap<String, TrackerCounters>,
    pub created_at_epoch: i64,
    pub updated_at_epoch: i64,
}

impl From<&TrackerState> for TrackerSummary {
    fn from(state: &TrackerState) -> Self {
        Self {
            records: state.clips.len(),
            counters: state.counters,
            per_camera: state.per_camera.clone(),
            created_at_epoch: state.created_at_epoch,
            updated_at_epoch: state.updated_at_epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ExportStatus::Success,
            ExportStatus::Failed,
            ExportStatus::Skipped,
            ExportStatus::InProgress,
        ] {
            assert_eq!(ExportStatus::from_label(status.as_str()), status);
        }
    }

    #[test]
    fn test_unknown_status_is_failed() {
        assert_eq!(ExportStatus::from_label("exploded"), ExportStatus::Failed);
        assert_eq!(ExportStatus::from_label(""), ExportStatus::Failed);
        let s: ExportStatus = serde_json::from_value(json!("weird")).unwrap();
        assert_eq!(s, ExportStatus::Failed);
    }

    #[test]
    fn test_identity_key() {
        let id = ClipIdentity::new("front", "@2026-01-10_180000");
        assert_eq!(id.key(), "front|@2026-01-10_180000");
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut fields = RecordFields {
            export_id: Some("E1".into()),
            started_at_epoch: Some(100),
            reason: Some("queued".into()),
            ..Default::default()
        };
        fields.merge_from(RecordFields {
            filename: Some("front.mp4".into()),
            reason: Some("done".into()),
            ..Default::default()
        });
        assert_eq!(fields.export_id.as_deref(), Some("E1"));
        assert_eq!(fields.started_at_epoch, Some(100));
        assert_eq!(fields.filename.as_deref(), Some("front.mp4"));
        assert_eq!(fields.reason.as_deref(), Some("done"));
    }

    #[test]
    fn test_record_preserves_unknown_keys() {
        let raw = json!({
            "camera": "front",
            "clip": "@1",
            "status": "failed",
            "updatedAtEpoch": 5,
            "error": "boom",
            "operatorNote": "retry later"
        });
        let record: TrackerRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.fields.error.as_deref(), Some("boom"));
        assert_eq!(record.extra.len(), 1);
        assert_eq!(record.extra["operatorNote"], json!("retry later"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["operatorNote"], json!("retry later"));
        assert_eq!(back["error"], json!("boom"));
        assert!(back.get("uri").is_none());
    }

    #[test]
    fn test_state_defaults_on_sparse_file() {
        let state: TrackerState = serde_json::from_value(json!({"clips": {}})).unwrap();
        assert_eq!(state.version, STATE_VERSION);
        assert!(state.events.is_empty());
        assert_eq!(state.counters.total(), 0);
    }

    #[test]
    fn test_counters_bump() {
        let mut c = TrackerCounters::default();
        c.bump(ExportStatus::Success);
        c.bump(ExportStatus::Skipped);
        c.bump(ExportStatus::Skipped);
        c.bump(ExportStatus::InProgress);
        assert_eq!(
            c,
            TrackerCounters {
                success: 1,
                failed: 0,
                skipped: 2
            }
        );
        assert_eq!(c.total(), 3);
    }
}
