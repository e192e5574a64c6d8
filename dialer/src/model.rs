//! Core campaign data types
//!
//! Leads, their retry metadata, and the immutable record of each placed call.
//! These are the values exchanged with the persistence collaborator.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a lead
pub type LeadId = String;

/// Unique identifier for a campaign
pub type CampaignId = String;

/// Unique identifier for a batch job
pub type JobId = String;

/// Identifier assigned to a live call by the calling service
pub type CallId = String;

/// Commercial status of a lead, as reported by the scoring collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Called but never picked up
    NotPick,
    /// Picked up, low interest
    Cold,
    /// Picked up, some interest
    Warm,
    /// High-value lead; reserved for human handling
    Hot,
}

impl LeadStatus {
    /// Dial priority within a batch (lower dials first). Hot leads are never dialed.
    pub fn dial_priority(&self) -> Option<u8> {
        match self {
            LeadStatus::NotPick => Some(0),
            LeadStatus::Cold => Some(1),
            LeadStatus::Warm => Some(2),
            LeadStatus::Hot => None,
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadStatus::NotPick => write!(f, "not_pick"),
            LeadStatus::Cold => write!(f, "cold"),
            LeadStatus::Warm => write!(f, "warm"),
            LeadStatus::Hot => write!(f, "hot"),
        }
    }
}

/// Claim state of a lead within the current batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    /// Waiting to be dialed
    Pending,
    /// Claimed by a batch loop; a call is in flight
    InProgress,
    /// Call finished (any business outcome)
    Completed,
    /// Placement failed
    Failed,
    /// Claimed, then left undialed: the lead turned hot or lost auto-dial
    /// after the batch snapshot was taken
    Skipped,
}

impl ClaimState {
    /// Whether the lead still needs work in the current batch
    pub fn is_outstanding(&self) -> bool {
        matches!(self, ClaimState::Pending | ClaimState::InProgress)
    }
}

/// Channel used to follow up with a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpChannel {
    Voice,
    Sms,
    Whatsapp,
    Email,
}

impl std::fmt::Display for FollowUpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FollowUpChannel::Voice => write!(f, "voice"),
            FollowUpChannel::Sms => write!(f, "sms"),
            FollowUpChannel::Whatsapp => write!(f, "whatsapp"),
            FollowUpChannel::Email => write!(f, "email"),
        }
    }
}

/// Coarse part of the local day, used to alternate retry windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayPart {
    Morning,
    Afternoon,
}

impl DayPart {
    /// Day part of a timestamp in its own (local) offset
    pub fn of<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        if at.hour() < 12 {
            DayPart::Morning
        } else {
            DayPart::Afternoon
        }
    }

    pub fn alternate(self) -> Self {
        match self {
            DayPart::Morning => DayPart::Afternoon,
            DayPart::Afternoon => DayPart::Morning,
        }
    }
}

/// Retry bookkeeping owned by a lead
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryMetadata {
    /// Consecutive no-pickup attempts
    pub retry_count: u32,
    /// When the last no-pickup attempt was made
    pub last_attempted_at: Option<DateTime<Utc>>,
    /// Why the last retry was scheduled (e.g. "no_answer", "busy")
    pub last_retry_reason: Option<String>,
    /// Earliest time the lead may be dialed again
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// A lead in a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadEntry {
    pub id: LeadId,
    pub campaign_id: CampaignId,
    pub phone: String,
    pub status: LeadStatus,
    pub claim_state: ClaimState,
    pub last_call_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry: RetryMetadata,
    pub follow_up_channel: FollowUpChannel,
    /// Cleared once the retry ladder stops automatic dialing
    pub auto_dial: bool,
}

impl LeadEntry {
    /// Create a fresh, never-called lead
    pub fn new(
        id: impl Into<LeadId>,
        campaign_id: impl Into<CampaignId>,
        phone: impl Into<String>,
        status: LeadStatus,
    ) -> Self {
        Self {
            id: id.into(),
            campaign_id: campaign_id.into(),
            phone: phone.into(),
            status,
            claim_state: ClaimState::Pending,
            last_call_at: None,
            retry: RetryMetadata::default(),
            follow_up_channel: FollowUpChannel::Voice,
            auto_dial: true,
        }
    }

    pub fn with_last_call_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_call_at = Some(at);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry.retry_count = retry_count;
        self
    }

    /// Apply a status reported by the scoring collaborator.
    ///
    /// Any status other than `NotPick` clears the retry ladder.
    pub fn apply_scored_status(&mut self, status: LeadStatus) {
        if status != LeadStatus::NotPick {
            self.retry = RetryMetadata::default();
            self.follow_up_channel = FollowUpChannel::Voice;
        }
        self.status = status;
    }
}

/// Terminal result of a placed call, as reported by the calling service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallResultStatus {
    Completed,
    NoAnswer,
    Busy,
    Failed,
}

impl CallResultStatus {
    /// No-pickup outcomes follow the retry ladder
    pub fn is_no_pickup(&self) -> bool {
        matches!(self, CallResultStatus::NoAnswer | CallResultStatus::Busy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallResultStatus::Completed => "completed",
            CallResultStatus::NoAnswer => "no_answer",
            CallResultStatus::Busy => "busy",
            CallResultStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CallResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One placed call. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAttempt {
    pub id: String,
    pub lead_id: LeadId,
    pub job_id: JobId,
    pub call_id: Option<CallId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: u32,
    pub result_status: CallResultStatus,
}

impl CallAttempt {
    pub fn new(
        lead_id: &str,
        job_id: &str,
        call_id: Option<CallId>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        duration_seconds: u32,
        result_status: CallResultStatus,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lead_id: lead_id.to_string(),
            job_id: job_id.to_string(),
            call_id,
            started_at,
            ended_at,
            duration_seconds,
            result_status,
        }
    }
}
