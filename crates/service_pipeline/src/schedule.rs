//! Daily trigger at a fixed local time.
//!
//! Missed slots are not caught up: after each run the next slot is computed
//! from the current time.

use crate::config::ConfigError;
use crate::context::CancellationFlag;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// A time of day at a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
    offset: FixedOffset,
}

impl DailySchedule {
    /// Schedule at `at` in `offset`.
    pub fn new(at: NaiveTime, offset: FixedOffset) -> Self {
        Self { at, offset }
    }

    /// Parse `HH:MM` and `+HH:MM` / `-HH:MM`.
    pub fn parse(time: &str, offset: &str) -> Result<Self, ConfigError> {
        let at = NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|e| ConfigError::Invalid {
            field: "RATES_SCHEDULE_TIME",
            reason: format!("{time:?}: {e}"),
        })?;
        let offset = parse_offset(offset).ok_or_else(|| ConfigError::Invalid {
            field: "RATES_SCHEDULE_OFFSET",
            reason: format!("{offset:?} is not of the form +HH:MM"),
        })?;
        Ok(Self { at, offset })
    }

    /// UTC offset of the schedule.
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Calendar date at `now` in the schedule's offset.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// First trigger strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset).naive_local();
        let mut candidate = local.date().and_time(self.at);
        if candidate <= local {
            candidate += TimeDelta::days(1);
        }
        let utc = candidate - TimeDelta::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc)
    }

    /// Time from `now` until the next trigger.
    pub fn until_next(&self, now: DateTime<Utc>) -> Duration {
        (self.next_after(now) - now).to_std().unwrap_or_default()
    }
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Trigger `run` at every slot of `schedule` until `shutdown` is set.
///
/// Each run completes before the next slot is computed, so runs never
/// overlap. Shutdown interrupts the wait between slots immediately.
pub async fn run_daily<F, Fut>(schedule: &DailySchedule, shutdown: &CancellationFlag, mut run: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    while !shutdown.is_cancelled() {
        let now = Utc::now();
        let next = schedule.next_after(now);
        info!(next_run = %next.with_timezone(&schedule.offset), "Waiting for next scheduled run");
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested; scheduler exiting");
                break;
            }
            _ = tokio::time::sleep(schedule.until_next(now)) => {}
        }
        run().await;
    }
}
