//! Lead Queue Selector
//!
//! Builds the ordered snapshot of leads a batch will dial. The snapshot is
//! taken once at batch start; leads added afterwards wait for the next run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::model::{LeadEntry, LeadId, LeadStatus};
use crate::policy::in_cooldown;

/// Filter parameters for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub cooldown_hours: i64,
    pub max_retries: u32,
}

/// Why a lead was left out of the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Hot leads belong to humans
    Hot,
    /// Missed too many times already
    RetriesExhausted,
    /// Called too recently
    Cooldown,
    /// Retry ladder moved the lead off automatic dialing
    AutoDialDisabled,
    /// Scheduled retry time not reached yet
    RetryNotDue,
}

/// Check one lead against the criteria
pub fn exclusion(
    lead: &LeadEntry,
    criteria: &SelectionCriteria,
    now: DateTime<Utc>,
) -> Option<Exclusion> {
    if lead.status == LeadStatus::Hot {
        return Some(Exclusion::Hot);
    }
    if lead.status == LeadStatus::NotPick && lead.retry.retry_count >= criteria.max_retries {
        return Some(Exclusion::RetriesExhausted);
    }
    if !lead.auto_dial {
        return Some(Exclusion::AutoDialDisabled);
    }
    if in_cooldown(lead, criteria.cooldown_hours, now) {
        return Some(Exclusion::Cooldown);
    }
    if lead.retry.next_attempt_at.is_some_and(|at| at > now) {
        return Some(Exclusion::RetryNotDue);
    }
    None
}

/// Select and order the leads eligible for a batch.
///
/// Order: not-picked first, then cold, then warm; within a status the lead
/// waiting longest (oldest or no `last_call_at`) goes first; ties break on id.
pub fn select_eligible_leads(
    leads: &[LeadEntry],
    criteria: &SelectionCriteria,
    now: DateTime<Utc>,
) -> Vec<LeadId> {
    let mut eligible: Vec<&LeadEntry> = leads
        .iter()
        .filter(|lead| match exclusion(lead, criteria, now) {
            Some(reason) => {
                debug!(lead_id = %lead.id, ?reason, "Lead excluded from batch");
                false
            }
            None => true,
        })
        .collect();

    eligible.sort_by(|a, b| compare_for_dialing(a, b));
    eligible.into_iter().map(|lead| lead.id.clone()).collect()
}

fn compare_for_dialing(a: &LeadEntry, b: &LeadEntry) -> Ordering {
    a.status
        .dial_priority()
        .cmp(&b.status.dial_priority())
        // None (never called) sorts before any timestamp
        .then_with(|| a.last_call_at.cmp(&b.last_call_at))
        .then_with(|| a.id.cmp(&b.id))
}
