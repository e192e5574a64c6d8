//! Campaign orchestrator: the registry of batch jobs and the operator command surface.
//!
//! Owns one [`JobSlot`] per job it knows about and one runner task per
//! non-terminal job. Commands validate against the state graph under the
//! job's lock, persist, publish, and only then signal the runner.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::scheduler::{BatchRunner, JobSlot, RunnerContext};
use super::state::{BatchCounters, BatchJob, BatchProgress, BatchState, PauseReason};
use crate::clock::SharedClock;
use crate::collab::{SharedCallPlacer, SharedScorer};
use crate::config::{ConfigError, DialerConfig};
use crate::error::{CommandError, CommandResult};
use crate::events::{DialerEvent, SharedEventBus};
use crate::model::{ClaimState, JobId, LeadId, LeadStatus};
use crate::monitor::SharedLiveMonitor;
use crate::policy::{CallWindow, RetryPolicy};
use crate::queue::{select_eligible_leads, SelectionCriteria};
use crate::store::{SharedStore, StoreError};

/// Collaborators an orchestrator is wired with
#[derive(Clone)]
pub struct Collaborators {
    pub store: SharedStore,
    pub placer: SharedCallPlacer,
    pub scorer: SharedScorer,
    pub bus: SharedEventBus,
    pub monitor: SharedLiveMonitor,
    pub clock: SharedClock,
}

/// Registry and command surface for batch jobs
pub struct CampaignOrchestrator {
    ctx: Arc<RunnerContext>,
    jobs: Mutex<HashMap<JobId, Arc<JobSlot>>>,
}

impl CampaignOrchestrator {
    /// Validate the configuration and wire the collaborators
    pub fn new(config: DialerConfig, deps: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        let window = CallWindow::from_config(&config.window)?;
        let retry = RetryPolicy::new(config.retry.clone(), window.offset());
        Ok(Self {
            ctx: Arc::new(RunnerContext {
                config,
                window,
                retry,
                store: deps.store,
                placer: deps.placer,
                scorer: deps.scorer,
                bus: deps.bus,
                monitor: deps.monitor,
                clock: deps.clock,
                shutdown: CancellationToken::new(),
            }),
            jobs: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &DialerConfig {
        &self.ctx.config
    }

    pub fn bus(&self) -> &SharedEventBus {
        &self.ctx.bus
    }

    pub fn monitor(&self) -> &SharedLiveMonitor {
        &self.ctx.monitor
    }

    pub fn store(&self) -> &SharedStore {
        &self.ctx.store
    }

    /// Snapshot the campaign's eligible leads and start dialing them.
    ///
    /// `None` for either parameter uses the configured default. Fails with
    /// `InvalidStateTransition` while another job of the campaign is active.
    /// Leads still on a call from an earlier job are left out of the snapshot.
    pub fn start(
        &self,
        campaign_id: &str,
        cooldown_hours: Option<i64>,
        max_retries: Option<u32>,
    ) -> CommandResult<JobId> {
        let mut jobs = self.lock_jobs()?;
        for slot in jobs.values() {
            let job = slot.snapshot()?;
            if job.campaign_id == campaign_id && !job.is_terminal() {
                warn!(
                    campaign_id,
                    active_job = %job.id,
                    state = %job.state,
                    "Campaign already has an active batch"
                );
                return Err(CommandError::InvalidStateTransition {
                    from: job.state,
                    to: BatchState::Queued,
                });
            }
        }

        let now = self.ctx.clock.now();
        let criteria = SelectionCriteria {
            cooldown_hours: cooldown_hours.unwrap_or(self.ctx.config.default_cooldown_hours),
            max_retries: max_retries.unwrap_or(self.ctx.config.default_max_retries),
        };
        let (on_call, leads): (Vec<_>, Vec<_>) = self
            .ctx
            .store
            .campaign_leads(campaign_id)?
            .into_iter()
            .partition(|lead| lead.claim_state == ClaimState::InProgress);
        if !on_call.is_empty() {
            info!(
                campaign_id,
                count = on_call.len(),
                "Leads still on a call from an earlier batch left out"
            );
        }
        let ordered = select_eligible_leads(&leads, &criteria, now);

        let mut job = BatchJob::new(
            campaign_id,
            ordered,
            criteria.cooldown_hours,
            criteria.max_retries,
            now,
        );
        job.advance(BatchState::Queued, Some("start"), now)?;
        self.ctx.store.reset_claims(&job.ordered_lead_ids)?;
        self.ctx.store.save_job(&job)?;

        info!(
            job_id = %job.id,
            campaign_id,
            eligible = job.total(),
            candidates = leads.len(),
            "Batch queued"
        );

        let job_id = job.id.clone();
        let slot = JobSlot::new(job, &self.ctx.shutdown);
        self.spawn_runner(&slot)?;
        jobs.insert(job_id.clone(), slot);
        Ok(job_id)
    }

    /// Running → Paused by operator command
    pub fn pause(&self, job_id: &str) -> CommandResult<()> {
        let slot = self.slot(job_id)?;
        let now = self.ctx.clock.now();
        slot.transition(self.ctx.store.as_ref(), |job| {
            job.pause(PauseReason::Operator, now)?;
            Ok(())
        })?;
        info!(job_id, "Batch paused by operator");
        self.ctx.bus.publish(DialerEvent::BatchPaused {
            job_id: job_id.to_string(),
            reason: PauseReason::Operator,
            timestamp: now,
        });
        Ok(())
    }

    /// Paused → Running. The runner continues from the persisted cursor.
    pub fn resume(&self, job_id: &str) -> CommandResult<()> {
        let slot = self.slot(job_id)?;
        let now = self.ctx.clock.now();
        let job = slot.transition(self.ctx.store.as_ref(), |job| {
            job.advance(BatchState::Running, Some("resume"), now)?;
            Ok(())
        })?;
        info!(job_id, cursor = job.cursor, "Batch resumed by operator");
        self.ctx.bus.publish(DialerEvent::BatchResumed {
            job_id: job_id.to_string(),
            automatic: false,
            timestamp: now,
        });
        slot.wake.notify_one();
        Ok(())
    }

    /// Stop a job for good. A call already in flight is allowed to finish.
    pub fn stop(&self, job_id: &str, actor_id: &str) -> CommandResult<()> {
        let slot = self.slot(job_id)?;
        let now = self.ctx.clock.now();
        slot.transition(self.ctx.store.as_ref(), |job| {
            job.stop(actor_id, now)?;
            Ok(())
        })?;
        info!(job_id, actor_id, "Batch stopped");
        self.ctx.bus.publish(DialerEvent::BatchStopped {
            job_id: job_id.to_string(),
            stopped_by: actor_id.to_string(),
            timestamp: now,
        });
        slot.stop.cancel();
        slot.wake.notify_one();
        Ok(())
    }

    /// A lead of the campaign turned hot outside the dialing loop.
    ///
    /// Marks the lead Hot and hands the campaign's active job to a human: a
    /// running job pauses, and a job paused for calling hours takes the
    /// hot-lead reason so the window reopening does not resume it. Returns
    /// the held job's id.
    pub fn lead_became_hot(
        &self,
        campaign_id: &str,
        lead_id: &str,
    ) -> CommandResult<Option<JobId>> {
        let store = self.ctx.store.as_ref();
        let mut lead = store
            .lead(lead_id)?
            .ok_or_else(|| StoreError::LeadNotFound(lead_id.to_string()))?;
        lead.apply_scored_status(LeadStatus::Hot);
        store.update_lead(&lead)?;

        let active = {
            let jobs = self.lock_jobs()?;
            let mut found = None;
            for slot in jobs.values() {
                let job = slot.snapshot()?;
                if job.campaign_id == campaign_id && !job.is_terminal() {
                    found = Some(Arc::clone(slot));
                    break;
                }
            }
            found
        };
        let Some(slot) = active else {
            info!(campaign_id, lead_id, "Lead turned hot; no active batch to hold");
            return Ok(None);
        };

        let now = self.ctx.clock.now();
        let reason = PauseReason::HotLead {
            lead_id: lead_id.to_string(),
        };
        let mut held = false;
        let job = slot.transition(store, |job| {
            held = job.hold_for_human(reason.clone(), now);
            Ok(())
        })?;
        if !held {
            info!(
                job_id = %job.id,
                campaign_id,
                lead_id,
                state = %job.state,
                "Lead turned hot; batch not dialing"
            );
            return Ok(None);
        }
        info!(job_id = %job.id, campaign_id, lead_id, "Lead turned hot; batch paused");
        self.ctx.bus.publish(DialerEvent::BatchPaused {
            job_id: job.id.clone(),
            reason,
            timestamp: now,
        });
        Ok(Some(job.id))
    }

    /// Restart after a crash: release claims left InProgress, repair counters
    /// and re-attach a runner to every non-terminal job. Returns the re-attached ids.
    ///
    /// Claims held by runners still alive in this orchestrator are kept.
    pub fn recover(&self) -> CommandResult<Vec<JobId>> {
        let store = self.ctx.store.as_ref();
        let mut jobs = self.lock_jobs()?;

        let mut owned: HashSet<LeadId> = HashSet::new();
        for slot in jobs.values().filter(|slot| slot.runner_alive()) {
            owned.extend(slot.snapshot()?.ordered_lead_ids);
        }
        let released = store.recover_in_progress(&owned)?;
        if !released.is_empty() {
            warn!(count = released.len(), "Released leads left in progress by a previous run");
        }

        let mut attached = Vec::new();
        for mut job in store.jobs()? {
            if job.is_terminal() || jobs.contains_key(&job.id) {
                continue;
            }

            let states = store.claim_states(&job.ordered_lead_ids)?;
            let mut counters = BatchCounters::default();
            for state in states.values() {
                match state {
                    ClaimState::Pending | ClaimState::InProgress => counters.pending += 1,
                    ClaimState::Completed => counters.completed += 1,
                    ClaimState::Failed => counters.failed += 1,
                    ClaimState::Skipped => counters.skipped += 1,
                }
            }
            job.counters = counters;
            store.save_job(&job)?;

            info!(
                job_id = %job.id,
                state = %job.state,
                cursor = job.cursor,
                pending = counters.pending,
                "Batch recovered"
            );
            let job_id = job.id.clone();
            let slot = JobSlot::new(job, &self.ctx.shutdown);
            self.spawn_runner(&slot)?;
            jobs.insert(job_id.clone(), slot);
            attached.push(job_id);
        }
        Ok(attached)
    }

    pub fn job(&self, job_id: &str) -> CommandResult<BatchJob> {
        if let Some(slot) = self.lock_jobs()?.get(job_id) {
            return Ok(slot.snapshot()?);
        }
        self.ctx
            .store
            .job(job_id)?
            .ok_or_else(|| CommandError::NotFound {
                job_id: job_id.to_string(),
            })
    }

    pub fn progress(&self, job_id: &str) -> CommandResult<BatchProgress> {
        Ok(self.job(job_id)?.progress())
    }

    /// Every persisted job, oldest first
    pub fn jobs(&self) -> CommandResult<Vec<BatchJob>> {
        Ok(self.ctx.store.jobs()?)
    }

    /// Cancel every runner and wait for them to exit.
    ///
    /// Calls in flight are abandoned; their leads stay InProgress until `recover`.
    pub async fn shutdown(&self) {
        self.ctx.shutdown.cancel();
        let handles: Vec<_> = match self.jobs.lock() {
            Ok(jobs) => jobs.values().filter_map(|slot| slot.take_handle()).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Batch runner task failed");
            }
        }
        info!("Orchestrator shut down");
    }

    /// Wait for a job's runner task to exit
    pub async fn wait(&self, job_id: &str) -> CommandResult<()> {
        let handle = self.slot(job_id)?.take_handle();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(job_id, error = %e, "Batch runner task failed");
            }
        }
        Ok(())
    }

    fn spawn_runner(&self, slot: &Arc<JobSlot>) -> CommandResult<()> {
        let job = slot.snapshot()?;
        let runner = BatchRunner::new(Arc::clone(&self.ctx), Arc::clone(slot), &job);
        slot.mark_alive(true);
        slot.attach(tokio::spawn(runner.run()));
        Ok(())
    }

    fn slot(&self, job_id: &str) -> CommandResult<Arc<JobSlot>> {
        self.lock_jobs()?
            .get(job_id)
            .cloned()
            .ok_or_else(|| CommandError::NotFound {
                job_id: job_id.to_string(),
            })
    }

    fn lock_jobs(&self) -> CommandResult<MutexGuard<'_, HashMap<JobId, Arc<JobSlot>>>> {
        self.jobs
            .lock()
            .map_err(|_| CommandError::Store(StoreError::LockPoisoned))
    }
}
