//! In-memory store
//!
//! A single mutex guards all tables, which makes every operation (claims
//! included) atomic with respect to every other.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::{DialerStore, StoreError, StoreResult};
use crate::batch::state::BatchJob;
use crate::model::{CallAttempt, ClaimState, JobId, LeadEntry, LeadId};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Tables {
    leads: BTreeMap<LeadId, LeadEntry>,
    attempts: Vec<CallAttempt>,
    jobs: BTreeMap<JobId, BatchJob>,
}

/// Mutex-guarded in-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Insert or replace leads, claim state included
    pub fn insert_leads(&self, leads: impl IntoIterator<Item = LeadEntry>) -> StoreResult<()> {
        let mut tables = self.lock()?;
        for lead in leads {
            tables.leads.insert(lead.id.clone(), lead);
        }
        Ok(())
    }

    pub fn lead_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.leads.len())
    }

    /// Write the whole store to a JSON file
    pub fn save_snapshot(&self, path: &Path) -> StoreResult<()> {
        let json = {
            let tables = self.lock()?;
            serde_json::to_string_pretty(&*tables)
                .map_err(|e| StoreError::Serialization(e.to_string()))?
        };
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Store snapshot saved");
        Ok(())
    }

    /// Load a store from a JSON snapshot. Returns `None` if the file does not exist.
    pub fn load_snapshot(path: &Path) -> StoreResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)?;
        let tables: Tables =
            serde_json::from_str(&json).map_err(|e| StoreError::Serialization(e.to_string()))?;
        info!(
            path = %path.display(),
            leads = tables.leads.len(),
            jobs = tables.jobs.len(),
            "Store snapshot loaded"
        );
        Ok(Some(Self {
            tables: Mutex::new(tables),
        }))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl DialerStore for MemoryStore {
    fn campaign_leads(&self, campaign_id: &str) -> StoreResult<Vec<LeadEntry>> {
        let tables = self.lock()?;
        Ok(tables
            .leads
            .values()
            .filter(|lead| lead.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    fn lead(&self, lead_id: &str) -> StoreResult<Option<LeadEntry>> {
        Ok(self.lock()?.leads.get(lead_id).cloned())
    }

    fn reset_claims(&self, lead_ids: &[LeadId]) -> StoreResult<()> {
        let mut tables = self.lock()?;
        for id in lead_ids {
            match tables.leads.get_mut(id) {
                Some(lead) if lead.claim_state != ClaimState::InProgress => {
                    lead.claim_state = ClaimState::Pending;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn claim_lead(&self, lead_id: &str) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        match tables.leads.get_mut(lead_id) {
            Some(lead) if lead.claim_state == ClaimState::Pending => {
                lead.claim_state = ClaimState::InProgress;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn finish_claim(&self, lead_id: &str, state: ClaimState) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let lead = tables
            .leads
            .get_mut(lead_id)
            .ok_or_else(|| StoreError::LeadNotFound(lead_id.to_string()))?;
        lead.claim_state = state;
        Ok(())
    }

    fn recover_in_progress(&self, keep: &HashSet<LeadId>) -> StoreResult<Vec<LeadId>> {
        let mut tables = self.lock()?;
        let mut reset = Vec::new();
        for lead in tables.leads.values_mut() {
            if lead.claim_state == ClaimState::InProgress && !keep.contains(&lead.id) {
                lead.claim_state = ClaimState::Pending;
                reset.push(lead.id.clone());
            }
        }
        Ok(reset)
    }

    fn claim_states(&self, lead_ids: &[LeadId]) -> StoreResult<HashMap<LeadId, ClaimState>> {
        let tables = self.lock()?;
        Ok(lead_ids
            .iter()
            .filter_map(|id| tables.leads.get(id).map(|lead| (id.clone(), lead.claim_state)))
            .collect())
    }

    fn update_lead(&self, lead: &LeadEntry) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let stored = tables
            .leads
            .get_mut(&lead.id)
            .ok_or_else(|| StoreError::LeadNotFound(lead.id.clone()))?;
        let claim_state = stored.claim_state;
        *stored = lead.clone();
        stored.claim_state = claim_state;
        Ok(())
    }

    fn record_attempt(&self, attempt: &CallAttempt) -> StoreResult<()> {
        self.lock()?.attempts.push(attempt.clone());
        Ok(())
    }

    fn attempts_for_lead(&self, lead_id: &str) -> StoreResult<Vec<CallAttempt>> {
        let tables = self.lock()?;
        Ok(tables
            .attempts
            .iter()
            .filter(|attempt| attempt.lead_id == lead_id)
            .cloned()
            .collect())
    }

    fn save_job(&self, job: &BatchJob) -> StoreResult<()> {
        self.lock()?.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn advance_cursor(&self, job_id: &str, cursor: usize) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let job = tables
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        if cursor < job.cursor {
            return Err(StoreError::CursorRegression {
                job_id: job_id.to_string(),
                current: job.cursor,
                requested: cursor,
            });
        }
        job.cursor = cursor;
        Ok(())
    }

    fn job(&self, job_id: &str) -> StoreResult<Option<BatchJob>> {
        Ok(self.lock()?.jobs.get(job_id).cloned())
    }

    fn jobs(&self) -> StoreResult<Vec<BatchJob>> {
        let tables = self.lock()?;
        let mut jobs: Vec<BatchJob> = tables.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CallResultStatus, LeadStatus};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store_with(ids: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_leads(
                ids.iter()
                    .map(|id| LeadEntry::new(*id, "camp-1", "+1000", LeadStatus::Cold)),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_claim_is_exclusive() {
        let store = Arc::new(store_with(&["lead-1"]));
        let winners = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if store.claim_lead("lead-1").unwrap() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.lead("lead-1").unwrap().unwrap().claim_state,
            ClaimState::InProgress
        );
    }

    #[test]
    fn test_claim_missing_or_finished_lead_fails() {
        let store = store_with(&["lead-1"]);
        assert!(!store.claim_lead("nope").unwrap());

        assert!(store.claim_lead("lead-1").unwrap());
        store.finish_claim("lead-1", ClaimState::Completed).unwrap();
        assert!(!store.claim_lead("lead-1").unwrap());

        store.reset_claims(&["lead-1".to_string()]).unwrap();
        assert!(store.claim_lead("lead-1").unwrap());
    }

    #[test]
    fn test_reset_leaves_calls_in_flight_alone() {
        let store = store_with(&["busy", "done"]);
        store.claim_lead("busy").unwrap();
        store.claim_lead("done").unwrap();
        store.finish_claim("done", ClaimState::Skipped).unwrap();

        store
            .reset_claims(&["busy".to_string(), "done".to_string()])
            .unwrap();
        assert_eq!(
            store.lead("busy").unwrap().unwrap().claim_state,
            ClaimState::InProgress
        );
        assert!(!store.claim_lead("busy").unwrap());
        assert!(store.claim_lead("done").unwrap());
    }

    #[test]
    fn test_recover_resets_in_progress_only() {
        let store = store_with(&["a", "b", "c"]);
        store.claim_lead("a").unwrap();
        store.claim_lead("b").unwrap();
        store.finish_claim("b", ClaimState::Failed).unwrap();

        assert_eq!(
            store.recover_in_progress(&HashSet::new()).unwrap(),
            vec!["a".to_string()]
        );
        let states = store
            .claim_states(&["a".to_string(), "b".to_string(), "zzz".to_string()])
            .unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states["a"], ClaimState::Pending);
        assert_eq!(states["b"], ClaimState::Failed);
    }

    #[test]
    fn test_recover_keeps_claims_of_live_runners() {
        let store = store_with(&["a", "b"]);
        store.claim_lead("a").unwrap();
        store.claim_lead("b").unwrap();

        let keep: HashSet<LeadId> = ["a".to_string()].into_iter().collect();
        assert_eq!(store.recover_in_progress(&keep).unwrap(), vec!["b".to_string()]);
        assert_eq!(
            store.lead("a").unwrap().unwrap().claim_state,
            ClaimState::InProgress
        );
    }

    #[test]
    fn test_update_lead_keeps_claim_state() {
        let store = store_with(&["a"]);
        store.claim_lead("a").unwrap();

        let mut lead = store.lead("a").unwrap().unwrap();
        lead.status = LeadStatus::Warm;
        lead.claim_state = ClaimState::Pending;
        store.update_lead(&lead).unwrap();

        let stored = store.lead("a").unwrap().unwrap();
        assert_eq!(stored.status, LeadStatus::Warm);
        assert_eq!(stored.claim_state, ClaimState::InProgress);

        let ghost = LeadEntry::new("ghost", "camp-1", "+1", LeadStatus::Cold);
        assert!(matches!(
            store.update_lead(&ghost),
            Err(StoreError::LeadNotFound(_))
        ));
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let job = BatchJob::new("camp-1", vec!["a".into(), "b".into()], 24, 3, now);
        store.save_job(&job).unwrap();

        store.advance_cursor(&job.id, 2).unwrap();
        assert_eq!(store.job(&job.id).unwrap().unwrap().cursor, 2);
        assert!(matches!(
            store.advance_cursor(&job.id, 1),
            Err(StoreError::CursorRegression { current: 2, .. })
        ));
        assert!(matches!(
            store.advance_cursor("missing", 1),
            Err(StoreError::JobNotFound(_))
        ));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();

        let store = store_with(&["a", "b"]);
        store.claim_lead("a").unwrap();
        store
            .record_attempt(&CallAttempt::new(
                "a",
                "job-1",
                Some("call-1".into()),
                now,
                now,
                0,
                CallResultStatus::NoAnswer,
            ))
            .unwrap();
        store.save_snapshot(&path).unwrap();

        let loaded = MemoryStore::load_snapshot(&path).unwrap().unwrap();
        assert_eq!(loaded.lead_count().unwrap(), 2);
        assert_eq!(
            loaded.lead("a").unwrap().unwrap().claim_state,
            ClaimState::InProgress
        );
        assert_eq!(loaded.attempts_for_lead("a").unwrap().len(), 1);

        assert!(MemoryStore::load_snapshot(&dir.path().join("missing.json"))
            .unwrap()
            .is_none());
    }
}
