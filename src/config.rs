//! YAML run configuration.
//!
//! The file is deserialized into [`FileConfig`] and then resolved into a
//! validated [`Config`]: paths expanded, timezone parsed, and the schedule
//! expanded into concrete jobs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::export::{ExportSettings, WorkerSettings};
use crate::nvr::ExportOptions;
use crate::retry::RetryConfig;
use crate::schedule::{self, DailyWindow, ExportJob, DEFAULT_DAYS};

#[derive(Debug, Deserialize)]
pub struct FileConfig {
    #[serde(alias = "blueiris")]
    pub server: ServerSection,
    #[serde(default = "default_export_root")]
    pub export_root: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub poll: PollSection,
    #[serde(default)]
    pub download: DownloadSection,
    #[serde(default)]
    pub export_options: ExportOptions,
    #[serde(default)]
    pub jobs: Vec<JobSection>,
    #[serde(default)]
    pub schedule: Option<ScheduleSection>,
}

#[derive(Deserialize)]
pub struct ServerSection {
    pub host: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ServerSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSection")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PollSection {
    pub interval_secs: u64,
    pub max_attempts: u32,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            max_attempts: 300,
        }
    }
}

/// Budget for "file not ready" retries after an export reports done.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    pub max_retries: u32,
    pub delay_secs: u64,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            max_retries: 29,
            delay_secs: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JobSection {
    pub camera: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleSection {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cameras: Vec<String>,
    #[serde(default)]
    pub days: Option<Vec<Weekday>>,
    #[serde(default)]
    pub start: Option<NaiveTime>,
    #[serde(default)]
    pub end: Option<NaiveTime>,
    #[serde(default)]
    pub timezone: Option<String>,
}

fn default_export_root() -> String {
    "~/bi-exports".to_string()
}

fn default_timezone() -> String {
    "America/Chicago".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    15
}

/// Resolved application configuration.
pub struct Config {
    pub host: String,
    pub username: String,
    pub password: Option<String>,
    pub timeout: Duration,
    pub export_root: PathBuf,
    pub timezone: Tz,
    pub workers: usize,
    pub worker: WorkerSettings,
    /// Explicit jobs first, then the expanded schedule.
    pub jobs: Vec<ExportJob>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("export_root", &self.export_root)
            .field("timezone", &self.timezone)
            .field("workers", &self.workers)
            .field("jobs", &self.jobs.len())
            .finish_non_exhaustive()
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn parse_timezone(name: &str) -> anyhow::Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("Unknown timezone '{}': {}", name, e))
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Config file not found: {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let file: FileConfig = serde_yaml::from_str(text)?;
        Self::resolve(file)
    }

    fn resolve(file: FileConfig) -> anyhow::Result<Self> {
        if file.server.host.trim().is_empty() {
            bail!("server.host must not be empty");
        }
        if file.workers == 0 {
            bail!("workers must be at least 1");
        }
        if file.poll.max_attempts == 0 {
            bail!("poll.max_attempts must be at least 1");
        }

        let timezone = parse_timezone(&file.timezone)?;

        let mut jobs = Vec::with_capacity(file.jobs.len());
        for job in &file.jobs {
            let tz = match &job.timezone {
                Some(name) => parse_timezone(name)?,
                None => timezone,
            };
            jobs.push(ExportJob {
                camera: job.camera.clone(),
                date: job.date,
                window: DailyWindow {
                    start: job.start,
                    end: job.end,
                },
                timezone: tz,
            });
        }

        if let Some(sched) = &file.schedule {
            let defaults = DailyWindow::default();
            let window = DailyWindow {
                start: sched.start.unwrap_or(defaults.start),
                end: sched.end.unwrap_or(defaults.end),
            };
            let tz = match &sched.timezone {
                Some(name) => parse_timezone(name)?,
                None => timezone,
            };
            let days = sched.days.as_deref().unwrap_or(&DEFAULT_DAYS);
            let expanded = schedule::build_jobs(
                sched.start_date,
                sched.end_date,
                &sched.cameras,
                days,
                window,
                tz,
            );
            if expanded.is_empty() {
                tracing::warn!(
                    start = %sched.start_date,
                    end = %sched.end_date,
                    cameras = sched.cameras.len(),
                    "Schedule expands to no jobs"
                );
            }
            jobs.extend(expanded);
        }

        Ok(Self {
            host: file.server.host,
            username: file.server.username,
            password: file.server.password,
            timeout: Duration::from_secs(file.server.timeout_secs),
            export_root: expand_tilde(&file.export_root),
            timezone,
            workers: file.workers,
            worker: WorkerSettings {
                options: file.export_options,
                poll_interval: Duration::from_secs(file.poll.interval_secs),
                poll_attempts: file.poll.max_attempts,
                download_retry: RetryConfig::fixed(
                    file.download.max_retries.saturating_add(1),
                    Duration::from_secs(file.download.delay_secs),
                ),
            },
            jobs,
        })
    }

    pub fn export_settings(&self) -> ExportSettings {
        ExportSettings {
            export_root: self.export_root.clone(),
            workers: self.workers,
            worker: self.worker.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvr::ExportFormat;

    const MINIMAL: &str = "
server:
  host: http://bi.local:81
  username: admin
";

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(cfg.host, "http://bi.local:81");
        assert_eq!(cfg.password, None);
        assert_eq!(cfg.timeout, Duration::from_secs(15));
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.timezone, chrono_tz::America::Chicago);
        assert_eq!(cfg.worker.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.worker.poll_attempts, 300);
        assert_eq!(cfg.worker.download_retry.total_attempts(), 30);
        assert_eq!(cfg.worker.options, ExportOptions::default());
        assert!(cfg.jobs.is_empty());
    }

    #[test]
    fn test_full_config() {
        let text = "
blueiris:
  host: http://bi.local:81
  username: admin
  password: hunter2
  timeout_secs: 30
export_root: /srv/exports
timezone: America/Chicago
workers: 2
poll: { interval_secs: 1, max_attempts: 10 }
download: { max_retries: 4, delay_secs: 3 }
export_options: { format: avi, overlay: true }
jobs:
  - camera: front
    date: 2026-01-10
    start: \"18:00:00\"
    end: \"23:00:00\"
  - camera: back
    date: 2026-01-11
    start: \"08:00:00\"
    end: \"09:00:00\"
    timezone: Europe/London
schedule:
  start_date: 2026-01-05
  end_date: 2026-01-11
  cameras: [drive]
  days: [Sat]
";
        let cfg = Config::from_yaml(text).unwrap();
        assert_eq!(cfg.password.as_deref(), Some("hunter2"));
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.export_root, PathBuf::from("/srv/exports"));
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.worker.poll_attempts, 10);
        assert_eq!(cfg.worker.download_retry.total_attempts(), 5);
        assert_eq!(cfg.worker.options.format, ExportFormat::Avi);
        assert!(cfg.worker.options.overlay);
        assert!(cfg.worker.options.reencode);

        assert_eq!(cfg.jobs.len(), 3);
        assert_eq!(cfg.jobs[0].camera, "front");
        assert_eq!(cfg.jobs[0].timezone, chrono_tz::America::Chicago);
        assert_eq!(cfg.jobs[1].timezone, chrono_tz::Europe::London);
        assert_eq!(cfg.jobs[2].camera, "drive");
        assert_eq!(cfg.jobs[2].date, NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
        assert_eq!(cfg.jobs[2].window, DailyWindow::default());

        let settings = cfg.export_settings();
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.export_root, PathBuf::from("/srv/exports"));
    }

    #[test]
    fn test_schedule_defaults_to_weekends() {
        let text = format!(
            "{MINIMAL}schedule:\n  start_date: 2026-01-05\n  end_date: 2026-01-11\n  cameras: [front, back]\n"
        );
        let cfg = Config::from_yaml(&text).unwrap();
        // Fri, Sat, Sun of that week for two cameras.
        assert_eq!(cfg.jobs.len(), 6);
        assert_eq!(cfg.jobs[0].camera, "front");
        assert_eq!(cfg.jobs[1].camera, "back");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let text = format!("{MINIMAL}workers: 0\n");
        let err = Config::from_yaml(&text).unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn test_zero_poll_attempts_rejected() {
        let text = format!("{MINIMAL}poll: {{ max_attempts: 0 }}\n");
        assert!(Config::from_yaml(&text).is_err());
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let text = format!("{MINIMAL}timezone: Mars/Olympus\n");
        let err = Config::from_yaml(&text).unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_missing_server_rejected() {
        assert!(Config::from_yaml("workers: 2\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/exports");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("exports"));
        }
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut cfg = Config::from_yaml(MINIMAL).unwrap();
        cfg.password = Some("hunter2".into());
        let dbg = format!("{:?}", cfg);
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }
}
