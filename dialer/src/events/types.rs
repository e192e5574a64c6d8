//! Event types published by the dialer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::batch::state::{BatchCounters, PauseReason};
use crate::collab::{Emotion, Objection, Urgency};
use crate::model::{CallId, CallResultStatus, CampaignId, JobId, LeadId, LeadStatus};
use crate::monitor::risk::{RecommendedAction, RiskLevel};
use crate::policy::RetryDecision;

/// All dialer notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialerEvent {
    /// A job moved from Queued to Running for the first time
    BatchStarted {
        job_id: JobId,
        campaign_id: CampaignId,
        total_leads: usize,
        timestamp: DateTime<Utc>,
    },

    /// The cursor moved past a lead
    BatchProgress {
        job_id: JobId,
        cursor: usize,
        total: usize,
        counters: BatchCounters,
        timestamp: DateTime<Utc>,
    },

    BatchPaused {
        job_id: JobId,
        reason: PauseReason,
        timestamp: DateTime<Utc>,
    },

    BatchResumed {
        job_id: JobId,
        /// Set when the call window reopened rather than an operator resuming
        automatic: bool,
        timestamp: DateTime<Utc>,
    },

    BatchCompleted {
        job_id: JobId,
        counters: BatchCounters,
        timestamp: DateTime<Utc>,
    },

    BatchStopped {
        job_id: JobId,
        stopped_by: String,
        timestamp: DateTime<Utc>,
    },

    /// Calling hours closed; no call was placed
    BatchSkippedOutsideWindow {
        job_id: JobId,
        next_window_start: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    CallStarted {
        job_id: JobId,
        lead_id: LeadId,
        call_id: CallId,
        timestamp: DateTime<Utc>,
    },

    CallEnded {
        job_id: JobId,
        lead_id: LeadId,
        call_id: CallId,
        result: CallResultStatus,
        duration_secs: u32,
        lead_status: LeadStatus,
        timestamp: DateTime<Utc>,
    },

    /// Placement error, timeout or a failed lifecycle result
    CallFailed {
        job_id: JobId,
        lead_id: LeadId,
        call_id: Option<CallId>,
        error: String,
        timestamp: DateTime<Utc>,
    },

    RetryScheduled {
        job_id: JobId,
        lead_id: LeadId,
        decision: RetryDecision,
        timestamp: DateTime<Utc>,
    },

    /// A snapshot lead was claimed but not dialed
    LeadSkipped {
        job_id: JobId,
        lead_id: LeadId,
        lead_status: LeadStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Published for every transcript chunk
    LiveUpdate {
        call_id: CallId,
        lead_id: LeadId,
        emotion: Emotion,
        urgency: Urgency,
        objections: BTreeSet<Objection>,
        risk_level: RiskLevel,
        chunk_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Published while risk is medium or high
    LiveRisk {
        call_id: CallId,
        lead_id: LeadId,
        risk_level: RiskLevel,
        reason: Option<String>,
        recommended_action: Option<RecommendedAction>,
        timestamp: DateTime<Utc>,
    },

    LiveSuggestion {
        call_id: CallId,
        lead_id: LeadId,
        key: String,
        text: String,
        timestamp: DateTime<Utc>,
    },
}

impl DialerEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DialerEvent::BatchStarted { timestamp, .. }
            | DialerEvent::BatchProgress { timestamp, .. }
            | DialerEvent::BatchPaused { timestamp, .. }
            | DialerEvent::BatchResumed { timestamp, .. }
            | DialerEvent::BatchCompleted { timestamp, .. }
            | DialerEvent::BatchStopped { timestamp, .. }
            | DialerEvent::BatchSkippedOutsideWindow { timestamp, .. }
            | DialerEvent::CallStarted { timestamp, .. }
            | DialerEvent::CallEnded { timestamp, .. }
            | DialerEvent::CallFailed { timestamp, .. }
            | DialerEvent::RetryScheduled { timestamp, .. }
            | DialerEvent::LeadSkipped { timestamp, .. }
            | DialerEvent::LiveUpdate { timestamp, .. }
            | DialerEvent::LiveRisk { timestamp, .. }
            | DialerEvent::LiveSuggestion { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            DialerEvent::BatchStarted { .. } => "batch_started",
            DialerEvent::BatchProgress { .. } => "batch_progress",
            DialerEvent::BatchPaused { .. } => "batch_paused",
            DialerEvent::BatchResumed { .. } => "batch_resumed",
            DialerEvent::BatchCompleted { .. } => "batch_completed",
            DialerEvent::BatchStopped { .. } => "batch_stopped",
            DialerEvent::BatchSkippedOutsideWindow { .. } => "batch_skipped_outside_window",
            DialerEvent::CallStarted { .. } => "call_started",
            DialerEvent::CallEnded { .. } => "call_ended",
            DialerEvent::CallFailed { .. } => "call_failed",
            DialerEvent::RetryScheduled { .. } => "retry_scheduled",
            DialerEvent::LeadSkipped { .. } => "lead_skipped",
            DialerEvent::LiveUpdate { .. } => "live_update",
            DialerEvent::LiveRisk { .. } => "live_risk",
            DialerEvent::LiveSuggestion { .. } => "live_suggestion",
        }
    }

    /// Job ID, for batch and call events
    pub fn job_id(&self) -> Option<&str> {
        match self {
            DialerEvent::BatchStarted { job_id, .. }
            | DialerEvent::BatchProgress { job_id, .. }
            | DialerEvent::BatchPaused { job_id, .. }
            | DialerEvent::BatchResumed { job_id, .. }
            | DialerEvent::BatchCompleted { job_id, .. }
            | DialerEvent::BatchStopped { job_id, .. }
            | DialerEvent::BatchSkippedOutsideWindow { job_id, .. }
            | DialerEvent::CallStarted { job_id, .. }
            | DialerEvent::CallEnded { job_id, .. }
            | DialerEvent::CallFailed { job_id, .. }
            | DialerEvent::RetryScheduled { job_id, .. }
            | DialerEvent::LeadSkipped { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        match self {
            DialerEvent::CallStarted { call_id, .. }
            | DialerEvent::CallEnded { call_id, .. }
            | DialerEvent::LiveUpdate { call_id, .. }
            | DialerEvent::LiveRisk { call_id, .. }
            | DialerEvent::LiveSuggestion { call_id, .. } => Some(call_id),
            DialerEvent::CallFailed { call_id, .. } => call_id.as_deref(),
            _ => None,
        }
    }

    pub fn lead_id(&self) -> Option<&str> {
        match self {
            DialerEvent::CallStarted { lead_id, .. }
            | DialerEvent::CallEnded { lead_id, .. }
            | DialerEvent::CallFailed { lead_id, .. }
            | DialerEvent::RetryScheduled { lead_id, .. }
            | DialerEvent::LeadSkipped { lead_id, .. }
            | DialerEvent::LiveUpdate { lead_id, .. }
            | DialerEvent::LiveRisk { lead_id, .. }
            | DialerEvent::LiveSuggestion { lead_id, .. } => Some(lead_id),
            _ => None,
        }
    }
}
