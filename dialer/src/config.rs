//! Dialer configuration
//!
//! Every knob has a default; `from_env` overlays `DIALER_*` variables, and the
//! whole struct deserializes from a config file section.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::model::FollowUpChannel;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid time of day '{value}' for {field} (expected HH:MM)")]
    InvalidTime { field: &'static str, value: String },

    #[error("Call window must start before it ends ({start} >= {end})")]
    EmptyWindow { start: String, end: String },

    #[error("Call window has no permitted weekdays")]
    NoWeekdays,

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Permitted calling hours, in a fixed UTC offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallWindowConfig {
    /// Offset of the campaign's local time from UTC, in minutes
    pub utc_offset_minutes: i32,
    /// Local opening time, `HH:MM`
    pub start: String,
    /// Local closing time, `HH:MM` (exclusive)
    pub end: String,
    /// Days on which calling is permitted
    pub weekdays: Vec<Weekday>,
}

impl Default for CallWindowConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            start: "09:00".to_string(),
            end: "19:00".to_string(),
            weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
            ],
        }
    }
}

/// Retry ladder tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first (same-day) retry
    pub same_day_delay_hours: i64,
    /// Delay before the second (next-day) retry
    pub next_day_delay_hours: i64,
    /// Lower-touch channel used once dialing stops
    pub fallback_channel: FollowUpChannel,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            same_day_delay_hours: 4,
            next_day_delay_hours: 24,
            fallback_channel: FollowUpChannel::Sms,
        }
    }
}

/// Top-level dialer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialerConfig {
    pub window: CallWindowConfig,
    pub retry: RetryConfig,
    /// Pause between two consecutive calls of one job
    pub pacing_delay_ms: u64,
    /// Upper bound on placing a call and receiving its terminal result
    pub placement_timeout_secs: u64,
    /// Upper bound between two state checks while a job is paused
    pub pause_poll_interval_ms: u64,
    /// Resume automatically once the window reopens after an "outside window" pause
    pub auto_resume_on_window: bool,
    /// Cooldown used when a start command does not give one
    pub default_cooldown_hours: i64,
    /// Retry cap used when a start command does not give one
    pub default_max_retries: u32,
    /// Per-subscriber event queue bound
    pub event_capacity: usize,
    /// Maximum concurrent bus subscribers
    pub max_subscribers: usize,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            window: CallWindowConfig::default(),
            retry: RetryConfig::default(),
            pacing_delay_ms: 2_000,
            placement_timeout_secs: 600,
            pause_poll_interval_ms: 30_000,
            auto_resume_on_window: true,
            default_cooldown_hours: 24,
            default_max_retries: 3,
            event_capacity: 256,
            max_subscribers: 64,
        }
    }
}

impl DialerConfig {
    /// Create config from defaults overlaid with environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `DIALER_*` environment variables onto this config
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("DIALER_WINDOW_START") {
            self.window.start = val;
        }
        if let Ok(val) = std::env::var("DIALER_WINDOW_END") {
            self.window.end = val;
        }
        if let Some(n) = env_parse("DIALER_UTC_OFFSET_MINUTES") {
            self.window.utc_offset_minutes = n;
        }
        if let Some(n) = env_parse("DIALER_PACING_DELAY_MS") {
            self.pacing_delay_ms = n;
        }
        if let Some(n) = env_parse("DIALER_PLACEMENT_TIMEOUT_SECS") {
            self.placement_timeout_secs = n;
        }
        if let Some(n) = env_parse("DIALER_PAUSE_POLL_MS") {
            self.pause_poll_interval_ms = n;
        }
        if let Ok(val) = std::env::var("DIALER_AUTO_RESUME_ON_WINDOW") {
            self.auto_resume_on_window = val.to_lowercase() == "true" || val == "1";
        }
        if let Some(n) = env_parse("DIALER_COOLDOWN_HOURS") {
            self.default_cooldown_hours = n;
        }
        if let Some(n) = env_parse("DIALER_MAX_RETRIES") {
            self.default_max_retries = n;
        }
        if let Some(n) = env_parse("DIALER_EVENT_CAPACITY") {
            self.event_capacity = n;
        }
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::policy::window::CallWindow::from_config(&self.window)?;
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "event_capacity",
                message: "must be at least 1".to_string(),
            });
        }
        if self.placement_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "placement_timeout_secs",
                message: "must be at least 1".to_string(),
            });
        }
        if self.default_cooldown_hours < 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_cooldown_hours",
                message: "must not be negative".to_string(),
            });
        }
        Ok(())
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn placement_timeout(&self) -> Duration {
        Duration::from_secs(self.placement_timeout_secs)
    }

    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_interval_ms.max(1))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}
