//! External collaborators
//!
//! Narrow seams to the calling service and the transcript scorer. The dialer
//! never places a phone call or reads text itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

#[cfg(test)]
use mockall::automock;

use crate::model::{CallId, CallResultStatus, LeadEntry, LeadStatus};

/// Errors from the calling service
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("Call service rejected lead {lead_id}: {reason}")]
    Rejected { lead_id: String, reason: String },

    #[error("Call service unavailable: {0}")]
    Unavailable(String),

    #[error("Call {call_id} dropped its result channel")]
    ResultLost { call_id: CallId },

    #[error("Call placement timed out after {0}s")]
    Timeout(u64),
}

/// Terminal result of a call lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub status: CallResultStatus,
    pub duration_secs: u32,
    /// Final transcript, empty when nobody picked up
    #[serde(default)]
    pub transcript: String,
}

impl CallResult {
    pub fn completed(duration_secs: u32, transcript: impl Into<String>) -> Self {
        Self {
            status: CallResultStatus::Completed,
            duration_secs,
            transcript: transcript.into(),
        }
    }

    pub fn missed(status: CallResultStatus) -> Self {
        Self {
            status,
            duration_secs: 0,
            transcript: String::new(),
        }
    }
}

/// A placed call whose terminal result arrives later
#[derive(Debug)]
pub struct CallHandle {
    pub call_id: CallId,
    pub result: oneshot::Receiver<CallResult>,
}

impl CallHandle {
    /// Handle plus the sender that completes it
    pub fn channel(call_id: impl Into<CallId>) -> (Self, oneshot::Sender<CallResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                call_id: call_id.into(),
                result: rx,
            },
            tx,
        )
    }

    /// Handle that already carries its result
    pub fn resolved(call_id: impl Into<CallId>, result: CallResult) -> Self {
        let (handle, tx) = Self::channel(call_id);
        let _ = tx.send(result);
        handle
    }
}

/// Calling service seam
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CallPlacer: Send + Sync {
    /// Start a call to the lead. Returns once the call is placed, not when it ends.
    async fn place_call(&self, lead: &LeadEntry) -> Result<CallHandle, PlacementError>;
}

/// Shared reference to a CallPlacer
pub type SharedCallPlacer = Arc<dyn CallPlacer>;

/// Caller emotion as judged from the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Neutral,
    Positive,
    Hesitant,
    Frustrated,
}

/// How pressing the caller's need sounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// Sales objection categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objection {
    Price,
    Trust,
    Timing,
    Need,
    Competitor,
}

impl fmt::Display for Objection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objection::Price => write!(f, "price"),
            Objection::Trust => write!(f, "trust"),
            Objection::Timing => write!(f, "timing"),
            Objection::Need => write!(f, "need"),
            Objection::Competitor => write!(f, "competitor"),
        }
    }
}

/// What the scorer makes of a transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub status: LeadStatus,
    pub emotion: Emotion,
    pub urgency: Urgency,
    pub objections: BTreeSet<Objection>,
}

impl Default for ScoreReport {
    fn default() -> Self {
        Self {
            status: LeadStatus::Cold,
            emotion: Emotion::Neutral,
            urgency: Urgency::Low,
            objections: BTreeSet::new(),
        }
    }
}

/// Transcript scoring seam. Pure and synchronous.
pub trait TranscriptScorer: Send + Sync {
    fn score_transcript(&self, transcript: &str, duration_secs: u32) -> ScoreReport;
}

/// Shared reference to a TranscriptScorer
pub type SharedScorer = Arc<dyn TranscriptScorer>;
