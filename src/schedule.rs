//! Export jobs and the calendar expansion that produces them.

use std::fmt;

use chrono::{
    Datelike, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, TimeZone, Weekday,
};
use chrono_tz::Tz;
use thiserror::Error;

pub const DEFAULT_DAYS: [Weekday; 3] = [Weekday::Fri, Weekday::Sat, Weekday::Sun];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("{date} {time} does not exist in {timezone} (DST gap)")]
    NonexistentLocalTime {
        date: NaiveDate,
        time: NaiveTime,
        timezone: Tz,
    },

    #[error("Window end {end} is not after start {start}")]
    EmptyWindow { start: NaiveTime, end: NaiveTime },
}

/// Local time-of-day range applied to every scheduled date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for DailyWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

/// One camera over one local time window on one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub camera: String,
    pub date: NaiveDate,
    pub window: DailyWindow,
    pub timezone: Tz,
}

impl ExportJob {
    /// The window as absolute UTC epoch seconds, resolved in the job's own
    /// timezone. A local time repeated by a DST fall-back resolves to its
    /// earliest instant. A local time skipped by a spring-forward keeps the
    /// offset in effect before the transition.
    pub fn epoch_window(&self) -> Result<(i64, i64), ScheduleError> {
        if self.window.end <= self.window.start {
            return Err(ScheduleError::EmptyWindow {
                start: self.window.start,
                end: self.window.end,
            });
        }
        Ok((
            self.resolve(self.window.start)?,
            self.resolve(self.window.end)?,
        ))
    }

    fn resolve(&self, time: NaiveTime) -> Result<i64, ScheduleError> {
        let local = NaiveDateTime::new(self.date, time);
        if let Some(dt) = self.timezone.from_local_datetime(&local).earliest() {
            return Ok(dt.timestamp());
        }
        tracing::debug!(%local, timezone = %self.timezone, "Local time falls in a DST gap");
        self.timezone
            .offset_from_local_datetime(&(local - TimeDelta::days(1)))
            .earliest()
            .map(|offset| local.and_utc().timestamp() - i64::from(offset.fix().local_minus_utc()))
            .ok_or(ScheduleError::NonexistentLocalTime {
                date: self.date,
                time,
                timezone: self.timezone,
            })
    }
}

impl fmt::Display for ExportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}-{} {}",
            self.camera,
            self.date.format("%Y-%m-%d"),
            self.window.start.format("%H:%M:%S"),
            self.window.end.format("%H:%M:%S"),
            self.timezone
        )
    }
}

/// Expand an inclusive date range into one job per (matching date, camera).
///
/// Dates are visited in order and cameras in the given order within a date.
/// `start > end` yields no jobs.
pub fn build_jobs(
    start: NaiveDate,
    end: NaiveDate,
    cameras: &[String],
    days: &[Weekday],
    window: DailyWindow,
    timezone: Tz,
) -> Vec<ExportJob> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| days.contains(&d.weekday()))
        .flat_map(|date| {
            cameras.iter().map(move |camera| ExportJob {
                camera: camera.clone(),
                date,
                window,
                timezone,
            })
        })
        .collect()
}
