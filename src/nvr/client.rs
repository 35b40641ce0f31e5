//! HTTP client for the Blue Iris JSON API.
//!
//! Every command is a POST to `<host>/json` carrying a session token obtained
//! through a two-step MD5 challenge login. HTTP basic auth is sent as well for
//! servers that protect the web interface.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;

use super::error::NvrError;
use super::responses::{self, CameraEntry, ClipEntry, Envelope, ExportData};
use super::{
    locator_file_name, CameraInfo, ClipDescriptor, ExportOptions, ExportProgress, ExportState,
    ExportTicket, NvrClient,
};

/// Blue Iris API client. Cheap to share behind an `Arc`; the session token
/// is guarded by an `RwLock` so concurrent workers read it freely and a
/// refresh is serialized.
pub struct BlueIrisClient {
    http: Client,
    host: String,
    username: String,
    password: String,
    session: RwLock<Option<String>>,
}

impl std::fmt::Debug for BlueIrisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueIrisClient")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl BlueIrisClient {
    pub fn new(
        host: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, NvrError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            host: host.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            session: RwLock::new(None),
        })
    }

    async fn send_json(&self, body: &Value) -> Result<Envelope, NvrError> {
        let url = format!("{}/json", self.host);
        tracing::debug!(cmd = %body["cmd"], "POST {}", url);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(NvrError::Unauthorized(
                "check credentials / web server auth".into(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NvrError::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        Ok(response.json::<Envelope>().await?)
    }

    /// Challenge/response login. Returns the session token to use.
    async fn login(&self) -> Result<String, NvrError> {
        let challenge = self.send_json(&json!({"cmd": "login"})).await?;
        let session = challenge
            .session
            .clone()
            .ok_or_else(|| NvrError::Login(format!("no session challenge: {}", challenge.describe())))?;

        let digest = md5::compute(format!("{}:{}:{}", self.username, session, self.password));
        let reply = self
            .send_json(&json!({
                "cmd": "login",
                "session": session,
                "response": format!("{:x}", digest),
            }))
            .await?;
        if !reply.is_success() {
            return Err(NvrError::Login(reply.describe()));
        }

        tracing::debug!("Logged in to {}", self.host);
        Ok(reply.session.unwrap_or(session))
    }

    async fn current_token(&self) -> Result<String, NvrError> {
        if let Some(token) = self.session.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.refresh_session(None).await
    }

    /// Log in again unless another task already replaced `stale` while we
    /// waited for the write lock.
    async fn refresh_session(&self, stale: Option<&str>) -> Result<String, NvrError> {
        let mut guard = self.session.write().await;
        if let Some(current) = guard.as_deref() {
            if Some(current) != stale {
                return Ok(current.to_string());
            }
        }
        if stale.is_some() {
            tracing::info!("Session rejected by server, logging in again");
        }
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Run one API command, refreshing the session once if the server
    /// rejects it.
    async fn command(&self, mut payload: Value) -> Result<Envelope, NvrError> {
        let cmd = payload["cmd"].as_str().unwrap_or_default().to_string();
        let mut token = self.current_token().await?;

        for attempt in 0..2 {
            payload["session"] = Value::String(token.clone());
            let envelope = self.send_json(&payload).await?;

            if envelope.is_session_failure() {
                if attempt == 0 {
                    token = self.refresh_session(Some(&token)).await?;
                    continue;
                }
                break;
            }
            if !envelope.is_success() {
                return Err(NvrError::Api {
                    cmd,
                    detail: envelope.describe(),
                });
            }
            return Ok(envelope);
        }

        Err(NvrError::SessionExpired)
    }
}

#[async_trait]
impl NvrClient for BlueIrisClient {
    async fn list_clips(
        &self,
        camera: &str,
        start_epoch: i64,
        end_epoch: i64,
    ) -> Result<Vec<ClipDescriptor>, NvrError> {
        let envelope = self
            .command(json!({
                "cmd": "cliplist",
                "camera": camera,
                "startdate": start_epoch,
                "enddate": end_epoch,
                "view": "stored",
            }))
            .await?;

        if envelope.data.is_null() {
            return Ok(Vec::new());
        }
        let entries: Vec<ClipEntry> = serde_json::from_value(envelope.data)?;
        Ok(entries
            .into_iter()
            .map(|e| ClipDescriptor {
                path: e.path,
                recorded_at_epoch: e.date,
                duration_ms: e.msec,
                resolution: e.res,
            })
            .collect())
    }

    async fn enqueue_export(
        &self,
        clip_path: &str,
        options: &ExportOptions,
    ) -> Result<ExportTicket, NvrError> {
        let envelope = self
            .command(json!({
                "cmd": "export",
                "path": clip_path,
                "audio": options.audio,
                "overlay": options.overlay,
                "format": options.format.code(),
                "reencode": options.reencode,
            }))
            .await?;

        let data: ExportData = if envelope.data.is_null() {
            ExportData::default()
        } else {
            serde_json::from_value(envelope.data)?
        };
        let job_id = data
            .path
            .filter(|p| !p.is_empty())
            .ok_or(NvrError::MissingField("path"))?;
        Ok(ExportTicket {
            job_id,
            locator: data.uri.filter(|u| !u.is_empty()),
        })
    }

    async fn export_status(&self, job_id: &str) -> Result<ExportProgress, NvrError> {
        let envelope = self
            .command(json!({"cmd": "export", "path": job_id}))
            .await?;

        let data: ExportData = if envelope.data.is_null() {
            ExportData::default()
        } else {
            serde_json::from_value(envelope.data)?
        };
        Ok(ExportProgress {
            state: ExportState::from_label(data.status.as_deref().unwrap_or_default()),
            locator: data.uri.filter(|u| !u.is_empty()),
            error: data.error,
            filesize_bytes: responses::parse_filesize(data.filesize.as_ref()),
        })
    }

    async fn download(
        &self,
        locator: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, NvrError> {
        let token = self.current_token().await?;
        let url = format!("{}/file/{}", self.host, locator_file_name(locator));

        tracing::debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("session", token.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(NvrError::Unauthorized("file download".into()));
        }
        if !status.is_success() {
            return Err(NvrError::NotReady {
                status: status.as_u16(),
            });
        }

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(written)
    }

    async fn list_cameras(&self) -> Result<Vec<CameraInfo>, NvrError> {
        let envelope = self.command(json!({"cmd": "camlist"})).await?;
        if envelope.data.is_null() {
            return Ok(Vec::new());
        }
        let entries: Vec<CameraEntry> = serde_json::from_value(envelope.data)?;
        Ok(entries
            .into_iter()
            .filter_map(|e| {
                let ip = e.ip?;
                Some(CameraInfo {
                    short_name: e.option_value.unwrap_or_default(),
                    display_name: e.option_display.unwrap_or_default(),
                    ip,
                    is_enabled: e.is_enabled,
                    is_online: e.is_online,
                })
            })
            .collect())
    }
}
