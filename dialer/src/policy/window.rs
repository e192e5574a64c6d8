//! Call-Window Policy: is calling permitted right now?
//!
//! Pure and deterministic: every answer depends only on the configured window
//! and the `now` passed in. The scheduler consults it immediately before each
//! placement, since a long batch can cross the closing time mid-run.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Utc, Weekday};

use crate::config::{CallWindowConfig, ConfigError};

/// Validated calling window
#[derive(Debug, Clone, PartialEq)]
pub struct CallWindow {
    offset: FixedOffset,
    start: NaiveTime,
    end: NaiveTime,
    weekdays: Vec<Weekday>,
}

impl CallWindow {
    /// Build a window, rejecting empty ranges and empty weekday sets
    pub fn new(
        offset: FixedOffset,
        start: NaiveTime,
        end: NaiveTime,
        weekdays: Vec<Weekday>,
    ) -> Result<Self, ConfigError> {
        if start >= end {
            return Err(ConfigError::EmptyWindow {
                start: start.format("%H:%M").to_string(),
                end: end.format("%H:%M").to_string(),
            });
        }
        if weekdays.is_empty() {
            return Err(ConfigError::NoWeekdays);
        }
        Ok(Self {
            offset,
            start,
            end,
            weekdays,
        })
    }

    pub fn from_config(config: &CallWindowConfig) -> Result<Self, ConfigError> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "window.utc_offset_minutes",
                message: format!("{} is out of range", config.utc_offset_minutes),
            }
        })?;
        let start = parse_time("window.start", &config.start)?;
        let end = parse_time("window.end", &config.end)?;
        Self::new(offset, start, end, config.weekdays.clone())
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Is a call placed at `now` inside the window?
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        if !self.weekdays.contains(&local.weekday()) {
            return false;
        }
        let time = local.time();
        time >= self.start && time < self.end
    }

    /// When the window next opens. Returns `now` if it is already open.
    pub fn next_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if self.is_within_window(now) {
            return now;
        }
        let local = now.with_timezone(&self.offset);
        for days_ahead in 0..=7 {
            let date = local.date_naive() + Duration::days(days_ahead);
            if !self.weekdays.contains(&date.weekday()) {
                continue;
            }
            let opening = date.and_time(self.start);
            let Some(opening) = self.offset.from_local_datetime(&opening).single() else {
                continue;
            };
            if opening > local {
                return opening.with_timezone(&Utc);
            }
        }
        // A validated window always opens within a week
        now + Duration::days(7)
    }
}

fn parse_time(field: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| ConfigError::InvalidTime {
        field,
        value: value.to_string(),
    })
}
