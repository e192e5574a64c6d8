//! Persistence contract
//!
//! The dialer never owns durable storage. It talks to a narrow store whose
//! only hard requirement is that [`DialerStore::claim_lead`] is atomic: of any
//! number of concurrent claims on one Pending lead, exactly one wins.
//!
//! [`MemoryStore`] is the in-process implementation, with JSON snapshots for
//! restart scenarios.

pub mod memory;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::batch::state::BatchJob;
use crate::model::{CallAttempt, CampaignId, ClaimState, JobId, LeadEntry, LeadId};

pub use memory::MemoryStore;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Lead not found: {0}")]
    LeadNotFound(LeadId),

    #[error("Batch job not found: {0}")]
    JobNotFound(JobId),

    #[error("Cursor for job {job_id} cannot move back from {current} to {requested}")]
    CursorRegression {
        job_id: JobId,
        current: usize,
        requested: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a store
pub type SharedStore = Arc<dyn DialerStore>;

/// Persistence operations the dialer needs
pub trait DialerStore: Send + Sync {
    /// All leads of a campaign, in id order
    fn campaign_leads(&self, campaign_id: &str) -> StoreResult<Vec<LeadEntry>>;

    fn lead(&self, lead_id: &str) -> StoreResult<Option<LeadEntry>>;

    /// Put the given leads back to Pending for a new batch. Leads still
    /// InProgress belong to a call in flight and are left alone.
    fn reset_claims(&self, lead_ids: &[LeadId]) -> StoreResult<()>;

    /// Atomically move a lead from Pending to InProgress.
    ///
    /// Returns `false` when the lead is missing or not Pending.
    fn claim_lead(&self, lead_id: &str) -> StoreResult<bool>;

    /// Move a claimed lead to its terminal claim state
    fn finish_claim(&self, lead_id: &str, state: ClaimState) -> StoreResult<()>;

    /// Reset InProgress leads to Pending after a crash, except those in
    /// `keep`. Returns the reset ids.
    fn recover_in_progress(&self, keep: &HashSet<LeadId>) -> StoreResult<Vec<LeadId>>;

    /// Claim states of the given leads; missing leads are omitted
    fn claim_states(&self, lead_ids: &[LeadId]) -> StoreResult<HashMap<LeadId, ClaimState>>;

    /// Write back lead fields. The claim state is left as stored.
    fn update_lead(&self, lead: &LeadEntry) -> StoreResult<()>;

    fn record_attempt(&self, attempt: &CallAttempt) -> StoreResult<()>;

    fn attempts_for_lead(&self, lead_id: &str) -> StoreResult<Vec<CallAttempt>>;

    fn save_job(&self, job: &BatchJob) -> StoreResult<()>;

    /// Persist a job's cursor. Rejects moving it backwards.
    fn advance_cursor(&self, job_id: &str, cursor: usize) -> StoreResult<()>;

    fn job(&self, job_id: &str) -> StoreResult<Option<BatchJob>>;

    /// All jobs, oldest first
    fn jobs(&self) -> StoreResult<Vec<BatchJob>>;

    /// Jobs of one campaign, oldest first
    fn campaign_jobs(&self, campaign_id: &CampaignId) -> StoreResult<Vec<BatchJob>> {
        Ok(self
            .jobs()?
            .into_iter()
            .filter(|job| &job.campaign_id == campaign_id)
            .collect())
    }
}
