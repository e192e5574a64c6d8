//! Batch job state machine: explicit states and legal transition guards.
//!
//! Every transition is validated against the state graph and appended to the
//! job's transition log, so a persisted job carries its own audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{CampaignId, JobId, LeadId};

/// The set of batch states.
///
/// Every job starts at `Idle` and terminates at `Stopped` or `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Created, lead snapshot not taken yet.
    Idle,
    /// Snapshot taken, waiting for its runner.
    Queued,
    /// Dialing.
    Running,
    /// Holding position; resumable.
    Paused,
    /// Stopped by an operator. Terminal.
    Stopped,
    /// Every snapshot lead processed. Terminal.
    Completed,
}

impl BatchState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Legal transitions between batch states.
///
/// ```text
/// Idle → Queued
/// Queued → Running | Stopped
/// Running → Paused | Stopped | Completed
/// Paused → Running | Stopped
/// ```
pub fn is_legal_transition(from: BatchState, to: BatchState) -> bool {
    use BatchState::*;

    matches!(
        (from, to),
        (Idle, Queued)
            | (Queued, Running)
            | (Queued, Stopped)
            | (Running, Paused)
            | (Running, Stopped)
            | (Running, Completed)
            | (Paused, Running)
            | (Paused, Stopped)
    )
}

/// Why a job is paused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PauseReason {
    /// Operator command
    Operator,
    /// Calling hours closed mid-run
    OutsideWindow,
    /// A lead turned hot and needs a human
    HotLead { lead_id: LeadId },
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseReason::Operator => write!(f, "operator"),
            PauseReason::OutsideWindow => write!(f, "outside window"),
            PauseReason::HotLead { lead_id } => write!(f, "hot lead {}", lead_id),
        }
    }
}

/// A single recorded state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: BatchState,
    pub to: BatchState,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: BatchState,
    pub to: BatchState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal batch transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Per-job lead counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounters {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    #[serde(default)]
    pub skipped: usize,
}

impl BatchCounters {
    pub fn claimed(&mut self) {
        self.pending = self.pending.saturating_sub(1);
        self.in_progress += 1;
    }

    pub fn finished(&mut self, succeeded: bool) {
        self.in_progress = self.in_progress.saturating_sub(1);
        if succeeded {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
    }

    /// A claimed lead was released without a call
    pub fn skipped(&mut self) {
        self.in_progress = self.in_progress.saturating_sub(1);
        self.skipped += 1;
    }

    pub fn processed(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

/// Point-in-time view of a job, for progress queries and events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub job_id: JobId,
    pub campaign_id: CampaignId,
    pub state: BatchState,
    pub cursor: usize,
    pub total: usize,
    pub counters: BatchCounters,
    pub pause_reason: Option<PauseReason>,
}

/// One dialing run over a campaign's lead snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: JobId,
    pub campaign_id: CampaignId,
    pub state: BatchState,
    /// Snapshot taken at start; never changes afterwards
    pub ordered_lead_ids: Vec<LeadId>,
    /// Index of the next lead to dial. Only moves forward.
    pub cursor: usize,
    pub cooldown_hours: i64,
    pub max_retries: u32,
    pub counters: BatchCounters,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<PauseReason>,
    pub stopped_by: Option<String>,
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
}

impl BatchJob {
    pub fn new(
        campaign_id: impl Into<CampaignId>,
        ordered_lead_ids: Vec<LeadId>,
        cooldown_hours: i64,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let counters = BatchCounters {
            pending: ordered_lead_ids.len(),
            ..Default::default()
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            campaign_id: campaign_id.into(),
            state: BatchState::Idle,
            ordered_lead_ids,
            cursor: 0,
            cooldown_hours,
            max_retries,
            counters,
            created_at: now,
            started_at: None,
            paused_at: None,
            stopped_at: None,
            completed_at: None,
            pause_reason: None,
            stopped_by: None,
            transitions: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.ordered_lead_ids.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Attempt to move to `to`, recording the transition.
    pub fn advance(
        &mut self,
        to: BatchState,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.state, to) {
            return Err(IllegalTransition {
                from: self.state,
                to,
            });
        }

        tracing::debug!(
            job_id = %self.id,
            from = %self.state,
            to = %to,
            "Batch state transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.state,
            to,
            at: now,
            reason: reason.map(String::from),
        });
        self.state = to;

        match to {
            BatchState::Running => {
                self.started_at.get_or_insert(now);
                self.paused_at = None;
                self.pause_reason = None;
            }
            BatchState::Paused => self.paused_at = Some(now),
            BatchState::Stopped => self.stopped_at = Some(now),
            BatchState::Completed => self.completed_at = Some(now),
            BatchState::Idle | BatchState::Queued => {}
        }
        Ok(())
    }

    pub fn pause(
        &mut self,
        reason: PauseReason,
        now: DateTime<Utc>,
    ) -> Result<(), IllegalTransition> {
        let label = reason.to_string();
        self.advance(BatchState::Paused, Some(&label), now)?;
        self.pause_reason = Some(reason);
        Ok(())
    }

    /// Hand the job to a human for a hot lead.
    ///
    /// A Running job pauses. A job paused only because calling hours closed
    /// keeps its state but takes the hot-lead reason, so reopening the window
    /// no longer resumes it. Returns `false` when the job is not dialing and
    /// not waiting on the window (already held by a human, queued or terminal).
    pub fn hold_for_human(&mut self, reason: PauseReason, now: DateTime<Utc>) -> bool {
        if self.state == BatchState::Running {
            return self.pause(reason, now).is_ok();
        }
        if self.state == BatchState::Paused
            && self.pause_reason == Some(PauseReason::OutsideWindow)
        {
            tracing::debug!(job_id = %self.id, %reason, "Window pause taken over by a human");
            self.pause_reason = Some(reason);
            self.paused_at = Some(now);
            return true;
        }
        false
    }

    pub fn stop(&mut self, actor_id: &str, now: DateTime<Utc>) -> Result<(), IllegalTransition> {
        self.advance(BatchState::Stopped, Some(actor_id), now)?;
        self.stopped_by = Some(actor_id.to_string());
        Ok(())
    }

    pub fn progress(&self) -> BatchProgress {
        BatchProgress {
            job_id: self.id.clone(),
            campaign_id: self.campaign_id.clone(),
            state: self.state,
            cursor: self.cursor,
            total: self.total(),
            counters: self.counters,
            pause_reason: self.pause_reason.clone(),
        }
    }
}
