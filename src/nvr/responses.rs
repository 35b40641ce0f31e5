//! Wire types for the Blue Iris JSON API.

use serde::Deserialize;
use serde_json::Value;

/// Envelope wrapping every `/json` reply.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.result.as_deref() == Some("success")
    }

    /// A `fail` result whose reason mentions the session. Only these trigger
    /// a re-login; every other failure is reported as-is.
    pub fn is_session_failure(&self) -> bool {
        if self.result.as_deref() != Some("fail") {
            return false;
        }
        self.data
            .get("reason")
            .and_then(Value::as_str)
            .is_some_and(|r| r.to_lowercase().contains("session"))
    }

    /// Compact rendering of the reply for error messages.
    pub fn describe(&self) -> String {
        serde_json::json!({
            "result": self.result,
            "data": self.data,
        })
        .to_string()
        .chars()
        .take(300)
        .collect()
    }
}

/// One entry of a `cliplist` reply.
#[derive(Debug, Deserialize)]
pub struct ClipEntry {
    pub path: String,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub msec: u64,
    #[serde(default)]
    pub res: Option<String>,
}

/// One entry of a `camlist` reply. Groups and the "all cameras" pseudo-entry
/// carry no `ip` and are filtered out by the caller.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraEntry {
    #[serde(default)]
    pub option_value: Option<String>,
    #[serde(default)]
    pub option_display: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default)]
    pub is_online: bool,
}

/// `data` of an `export` reply, both for enqueue and status queries.
#[derive(Debug, Default, Deserialize)]
pub struct ExportData {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub filesize: Option<Value>,
}

/// The server reports `filesize` either as a number or a numeric string.
pub fn parse_filesize(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_success() {
        let env: Envelope =
            serde_json::from_value(json!({"result": "success", "session": "abc", "data": []}))
                .unwrap();
        assert!(env.is_success());
        assert!(!env.is_session_failure());
        assert_eq!(env.session.as_deref(), Some("abc"));
    }

    #[test]
    fn test_envelope_session_failure() {
        let env: Envelope = serde_json::from_value(
            json!({"result": "fail", "data": {"reason": "Invalid Session"}}),
        )
        .unwrap();
        assert!(!env.is_success());
        assert!(env.is_session_failure());
    }

    #[test]
    fn test_envelope_other_failure_is_not_session() {
        let env: Envelope =
            serde_json::from_value(json!({"result": "fail", "data": {"reason": "bad camera"}}))
                .unwrap();
        assert!(!env.is_session_failure());
    }

    #[test]
    fn test_envelope_missing_data_defaults_to_null() {
        let env: Envelope = serde_json::from_value(json!({"result": "success"})).unwrap();
        assert!(env.data.is_null());
    }

    #[test]
    fn test_describe_truncates_long_replies() {
        let env = Envelope {
            result: Some("fail".into()),
            session: None,
            data: Value::String("é".repeat(400)),
        };
        assert_eq!(env.describe().chars().count(), 300);
    }

    #[test]
    fn test_clip_entry_deserialize() {
        let clip: ClipEntry = serde_json::from_value(json!({
            "path": "@2026-01-10_180000",
            "date": 1768089600,
            "msec": 60000,
            "res": "1920x1080",
            "camera": "front"
        }))
        .unwrap();
        assert_eq!(clip.path, "@2026-01-10_180000");
        assert_eq!(clip.date, 1768089600);
        assert_eq!(clip.msec, 60000);
        assert_eq!(clip.res.as_deref(), Some("1920x1080"));
    }

    #[test]
    fn test_camera_entry_deserialize() {
        let cam: CameraEntry = serde_json::from_value(json!({
            "optionValue": "front",
            "optionDisplay": "Front Door",
            "ip": "10.0.0.5",
            "isEnabled": true,
            "isOnline": false
        }))
        .unwrap();
        assert_eq!(cam.option_value.as_deref(), Some("front"));
        assert_eq!(cam.ip.as_deref(), Some("10.0.0.5"));
        assert!(cam.is_enabled);
        assert!(!cam.is_online);
    }

    #[test]
    fn test_parse_filesize_variants() {
        assert_eq!(parse_filesize(Some(&json!(1024))), Some(1024));
        assert_eq!(parse_filesize(Some(&json!("2048"))), Some(2048));
        assert_eq!(parse_filesize(Some(&json!("12 MB"))), None);
        assert_eq!(parse_filesize(Some(&json!(null))), None);
        assert_eq!(parse_filesize(None), None);
    }
}
