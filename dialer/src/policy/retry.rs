//! Retry / Cooldown Policy
//!
//! Deterministic retry ladder for no-pickup outcomes. Placement failures never
//! reach this module; only `NoAnswer`/`Busy` results climb the ladder.
//!
//! ```text
//! attempt 1 missed → same-day retry (+4h), same channel
//! attempt 2 missed → next-day retry in the other half of the day
//! attempt 3 missed → switch to a lower-touch channel, stop auto-dialing
//! attempt 4+ missed → drop: demote to cold, no automatic retries
//! ```

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RetryConfig;
use crate::model::{DayPart, FollowUpChannel, LeadEntry, LeadStatus};

/// What to do with a lead after a missed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryAction {
    /// Retry later the same day on the same channel
    SameDay,
    /// Retry the next day, in the other part of the day
    NextDay { day_part: DayPart },
    /// Stop dialing and follow up on a lower-touch channel
    SwitchChannel { channel: FollowUpChannel },
    /// Remove from active calling
    Drop,
}

impl std::fmt::Display for RetryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryAction::SameDay => write!(f, "same_day"),
            RetryAction::NextDay { .. } => write!(f, "next_day"),
            RetryAction::SwitchChannel { channel } => write!(f, "switch_channel({})", channel),
            RetryAction::Drop => write!(f, "drop"),
        }
    }
}

/// Decision produced by the retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryDecision {
    /// Whether the lead stays eligible for automatic dialing
    pub eligible: bool,
    pub action: RetryAction,
    pub delay_hours: i64,
    /// Retry count after this miss
    pub retry_count: u32,
    /// Earliest next automatic attempt, if any
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Follow-up channel after this miss
    pub channel: FollowUpChannel,
}

/// The retry ladder
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    offset: FixedOffset,
}

impl RetryPolicy {
    /// `offset` is the campaign's local offset, used to place next-day retries
    pub fn new(config: RetryConfig, offset: FixedOffset) -> Self {
        Self { config, offset }
    }

    /// Decide the retry tier for a lead that just missed a call at `now`.
    ///
    /// Tiers are keyed by the retry count the lead reaches with this miss;
    /// the first matching tier wins.
    pub fn decide(&self, lead: &LeadEntry, now: DateTime<Utc>) -> RetryDecision {
        let retry_count = lead.retry.retry_count.saturating_add(1);

        match retry_count {
            1 => {
                let delay = self.config.same_day_delay_hours;
                RetryDecision {
                    eligible: true,
                    action: RetryAction::SameDay,
                    delay_hours: delay,
                    retry_count,
                    next_attempt_at: Some(now + Duration::hours(delay)),
                    channel: lead.follow_up_channel,
                }
            }
            2 => {
                let delay = self.config.next_day_delay_hours;
                let day_part = DayPart::of(&now.with_timezone(&self.offset)).alternate();
                RetryDecision {
                    eligible: true,
                    action: RetryAction::NextDay { day_part },
                    delay_hours: delay,
                    retry_count,
                    next_attempt_at: Some(self.next_day_slot(now, delay, day_part)),
                    channel: lead.follow_up_channel,
                }
            }
            3 => RetryDecision {
                eligible: false,
                action: RetryAction::SwitchChannel {
                    channel: self.config.fallback_channel,
                },
                delay_hours: 0,
                retry_count,
                next_attempt_at: None,
                channel: self.config.fallback_channel,
            },
            _ => RetryDecision {
                eligible: false,
                action: RetryAction::Drop,
                delay_hours: 0,
                retry_count,
                next_attempt_at: None,
                channel: self.config.fallback_channel,
            },
        }
    }

    /// Write a decision into the lead's retry metadata and status
    pub fn apply(
        &self,
        lead: &mut LeadEntry,
        decision: &RetryDecision,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        lead.retry.retry_count = lead.retry.retry_count.max(decision.retry_count);
        lead.retry.last_attempted_at = Some(now);
        lead.retry.last_retry_reason = Some(reason.to_string());
        lead.retry.next_attempt_at = decision.next_attempt_at;
        lead.follow_up_channel = decision.channel;
        lead.auto_dial = decision.eligible;
        lead.status = match decision.action {
            RetryAction::Drop => LeadStatus::Cold,
            _ => LeadStatus::NotPick,
        };
    }

    /// Anchor a next-day retry on the requested half of the local day
    fn next_day_slot(
        &self,
        now: DateTime<Utc>,
        delay_hours: i64,
        day_part: DayPart,
    ) -> DateTime<Utc> {
        let base = (now + Duration::hours(delay_hours)).with_timezone(&self.offset);
        let anchor = match day_part {
            DayPart::Morning => NaiveTime::from_hms_opt(10, 0, 0),
            DayPart::Afternoon => NaiveTime::from_hms_opt(15, 0, 0),
        };
        anchor
            .and_then(|time| {
                self.offset
                    .from_local_datetime(&base.date_naive().and_time(time))
                    .single()
            })
            .map(|slot| slot.with_timezone(&Utc))
            .unwrap_or_else(|| base.with_timezone(&Utc))
    }
}

/// Cooldown gate: was the lead called within the last `cooldown_hours`?
pub fn in_cooldown(lead: &LeadEntry, cooldown_hours: i64, now: DateTime<Utc>) -> bool {
    match lead.last_call_at {
        Some(last) => now - last < Duration::hours(cooldown_hours),
        None => false,
    }
}
