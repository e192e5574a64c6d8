//! Per-job batch loop
//!
//! One [`BatchRunner`] task drives one job for its whole life. It never has
//! more than one call in flight, re-reads the job state before every lead,
//! and persists the cursor after every lead so a crash loses at most the call
//! that was in flight.
//!
//! ```text
//! ┌─▶ wait until Running ─▶ window open? ──no──▶ pause(OutsideWindow) ─┐
//! │                             │ yes                                  │
//! │                             ▼                                      │
//! │   claim ─▶ hot or no auto-dial? ──yes──▶ skip ──────▶ cursor++ ───▶┤
//! │                             │ no                                   │
//! │                             ▼                                      │
//! │        place + await result ─▶ retry/score ─▶ record ─▶ cursor++   │
//! │                                                        │           │
//! └──────────────────────────── pacing delay ◀─────────────┘◀──────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{BatchJob, BatchState, PauseReason};
use crate::clock::SharedClock;
use crate::collab::{CallHandle, CallResult, PlacementError, SharedCallPlacer, SharedScorer};
use crate::config::DialerConfig;
use crate::error::{CommandError, CommandResult};
use crate::events::{DialerEvent, SharedEventBus};
use crate::model::{
    CallAttempt, CallId, CallResultStatus, ClaimState, JobId, LeadEntry, LeadId, LeadStatus,
};
use crate::monitor::SharedLiveMonitor;
use crate::policy::{CallWindow, RetryPolicy};
use crate::store::{DialerStore, SharedStore, StoreError, StoreResult};

/// Everything a runner needs, shared by all runners of one orchestrator
pub(crate) struct RunnerContext {
    pub config: DialerConfig,
    pub window: CallWindow,
    pub retry: RetryPolicy,
    pub store: SharedStore,
    pub placer: SharedCallPlacer,
    pub scorer: SharedScorer,
    pub bus: SharedEventBus,
    pub monitor: SharedLiveMonitor,
    pub clock: SharedClock,
    /// Process shutdown; parent of every job's stop token
    pub shutdown: CancellationToken,
}

/// Registry entry for one job: its live state plus the signals its runner waits on
pub(crate) struct JobSlot {
    job: Mutex<BatchJob>,
    /// Poked on resume and stop so a paused runner re-reads its state at once
    pub wake: Notify,
    /// Cancelled on stop or shutdown
    pub stop: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    /// Set while a runner task is driving the job
    alive: AtomicBool,
}

impl JobSlot {
    pub fn new(job: BatchJob, shutdown: &CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            job: Mutex::new(job),
            wake: Notify::new(),
            stop: shutdown.child_token(),
            handle: Mutex::new(None),
            alive: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, BatchJob>> {
        self.job.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn snapshot(&self) -> StoreResult<BatchJob> {
        Ok(self.lock()?.clone())
    }

    pub fn state(&self) -> StoreResult<(BatchState, Option<PauseReason>)> {
        let job = self.lock()?;
        Ok((job.state, job.pause_reason.clone()))
    }

    /// Run `f` against the job under its lock, without persisting
    pub fn with_job<T>(&self, f: impl FnOnce(&mut BatchJob) -> T) -> StoreResult<T> {
        let mut job = self.lock()?;
        Ok(f(&mut job))
    }

    /// Mutate the job in place and persist it
    pub fn update<T>(
        &self,
        store: &dyn DialerStore,
        f: impl FnOnce(&mut BatchJob) -> T,
    ) -> StoreResult<T> {
        let mut job = self.lock()?;
        let out = f(&mut job);
        store.save_job(&job)?;
        Ok(out)
    }

    /// Apply `f` to a copy of the job and commit it only if `f` succeeds
    /// and the result is persisted. A rejected change leaves the job untouched.
    pub fn transition(
        &self,
        store: &dyn DialerStore,
        f: impl FnOnce(&mut BatchJob) -> CommandResult<()>,
    ) -> CommandResult<BatchJob> {
        let mut job = self.lock()?;
        let mut next = job.clone();
        f(&mut next)?;
        store.save_job(&next)?;
        *job = next;
        Ok(job.clone())
    }

    /// Whether a runner still owns this job's claims, including a stopped
    /// job whose last call has not settled yet
    pub fn runner_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn mark_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn attach(&self, handle: JoinHandle<()>) {
        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
    }

    pub fn take_handle(&self) -> Option<JoinHandle<()>> {
        self.handle.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// How a placement attempt ended
enum Placement {
    Finished { call_id: CallId, result: CallResult },
    Failed {
        call_id: Option<CallId>,
        error: PlacementError,
    },
    /// Process shutdown while the call was in flight
    Interrupted,
}

/// What happened to one snapshot lead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeadOutcome {
    /// A call was placed (or attempted) and settled
    Called,
    /// Not claimable or no longer dialable; no call was placed
    NoCall,
    /// Process shutdown while the call was in flight
    Interrupted,
}

/// Why a claimed lead must not be auto-dialed, if it must not
fn skip_reason(lead: &LeadEntry) -> Option<&'static str> {
    if lead.status == LeadStatus::Hot {
        Some("lead is hot and reserved for a human")
    } else if !lead.auto_dial {
        Some("auto-dial disabled")
    } else {
        None
    }
}

/// The loop for one batch job
pub(crate) struct BatchRunner {
    ctx: Arc<RunnerContext>,
    slot: Arc<JobSlot>,
    job_id: JobId,
    leads: Vec<LeadId>,
}

impl BatchRunner {
    pub fn new(ctx: Arc<RunnerContext>, slot: Arc<JobSlot>, job: &BatchJob) -> Self {
        Self {
            ctx,
            slot,
            job_id: job.id.clone(),
            leads: job.ordered_lead_ids.clone(),
        }
    }

    pub async fn run(self) {
        info!(job_id = %self.job_id, leads = self.leads.len(), "Batch runner started");
        match self.drive().await {
            Ok(()) => info!(job_id = %self.job_id, "Batch runner exited"),
            Err(e) => error!(job_id = %self.job_id, error = %e, "Batch runner aborted"),
        }
        self.slot.mark_alive(false);
    }

    async fn drive(&self) -> StoreResult<()> {
        self.begin()?;

        loop {
            if !self.wait_until_runnable().await? {
                return Ok(());
            }
            let cursor = self.slot.with_job(|job| job.cursor)?;
            let Some(lead_id) = self.leads.get(cursor) else {
                break;
            };
            if !self.window_open()? {
                continue;
            }
            let outcome = self.process_lead(lead_id).await?;
            if outcome == LeadOutcome::Interrupted {
                return Ok(());
            }
            self.advance_cursor(cursor + 1)?;
            if outcome == LeadOutcome::Called && !self.pace().await {
                return Ok(());
            }
        }

        self.finish().await
    }

    /// Queued → Running on first start; recovered jobs keep their state
    fn begin(&self) -> StoreResult<()> {
        let now = self.ctx.clock.now();
        let started = self.try_transition(|job| {
            if job.state != BatchState::Queued {
                return Ok(false);
            }
            job.advance(BatchState::Running, Some("runner started"), now)?;
            Ok(true)
        })?;
        if let Some((true, job)) = started {
            info!(
                job_id = %job.id,
                campaign_id = %job.campaign_id,
                total = job.total(),
                "Batch started"
            );
            self.ctx.bus.publish(DialerEvent::BatchStarted {
                job_id: job.id.clone(),
                campaign_id: job.campaign_id.clone(),
                total_leads: job.total(),
                timestamp: now,
            });
        }
        Ok(())
    }

    /// Block while Paused. Returns `false` once the job is terminal or stopped.
    async fn wait_until_runnable(&self) -> StoreResult<bool> {
        loop {
            if self.slot.stop.is_cancelled() {
                return Ok(false);
            }
            let (state, reason) = self.slot.state()?;
            match state {
                BatchState::Running => return Ok(true),
                BatchState::Paused => {
                    if reason == Some(PauseReason::OutsideWindow) && self.window_reopened() {
                        self.auto_resume()?;
                        continue;
                    }
                    tokio::select! {
                        _ = self.slot.stop.cancelled() => return Ok(false),
                        _ = self.slot.wake.notified() => {}
                        _ = tokio::time::sleep(self.ctx.config.pause_poll_interval()) => {}
                    }
                }
                BatchState::Stopped | BatchState::Completed => return Ok(false),
                BatchState::Idle | BatchState::Queued => {
                    warn!(job_id = %self.job_id, %state, "Runner found job not started");
                    return Ok(false);
                }
            }
        }
    }

    fn window_reopened(&self) -> bool {
        self.ctx.config.auto_resume_on_window
            && self.ctx.window.is_within_window(self.ctx.clock.now())
    }

    fn auto_resume(&self) -> StoreResult<()> {
        let now = self.ctx.clock.now();
        let resumed = self.try_transition(|job| {
            if job.pause_reason != Some(PauseReason::OutsideWindow) {
                return Ok(false);
            }
            job.advance(BatchState::Running, Some("call window reopened"), now)?;
            Ok(true)
        })?;
        if let Some((true, _)) = resumed {
            info!(job_id = %self.job_id, "Call window reopened; batch resumed");
            self.ctx.bus.publish(DialerEvent::BatchResumed {
                job_id: self.job_id.clone(),
                automatic: true,
                timestamp: now,
            });
        }
        Ok(())
    }

    /// Check the call window right before a placement. Pauses the job when closed.
    fn window_open(&self) -> StoreResult<bool> {
        let now = self.ctx.clock.now();
        if self.ctx.window.is_within_window(now) {
            return Ok(true);
        }
        let next_window_start = self.ctx.window.next_window_start(now);
        if self.pause(PauseReason::OutsideWindow)? {
            info!(job_id = %self.job_id, %next_window_start, "Outside call window; batch paused");
            self.ctx.bus.publish(DialerEvent::BatchSkippedOutsideWindow {
                job_id: self.job_id.clone(),
                next_window_start,
                timestamp: now,
            });
        }
        Ok(false)
    }

    /// Running → Paused. Returns whether this call made the transition.
    fn pause(&self, reason: PauseReason) -> StoreResult<bool> {
        let now = self.ctx.clock.now();
        let paused = self.try_transition(|job| {
            job.pause(reason.clone(), now)?;
            Ok(())
        })?;
        if paused.is_none() {
            return Ok(false);
        }
        self.ctx.bus.publish(DialerEvent::BatchPaused {
            job_id: self.job_id.clone(),
            reason,
            timestamp: now,
        });
        Ok(true)
    }

    /// Claim, re-check, dial and settle one lead
    async fn process_lead(&self, lead_id: &str) -> StoreResult<LeadOutcome> {
        let store = self.ctx.store.as_ref();
        if !store.claim_lead(lead_id)? {
            debug!(job_id = %self.job_id, lead_id, "Lead not claimable; skipping");
            return Ok(LeadOutcome::NoCall);
        }
        self.slot.update(store, |job| job.counters.claimed())?;

        // Status may have changed since the snapshot; read it under the claim
        let lead = store
            .lead(lead_id)?
            .ok_or_else(|| StoreError::LeadNotFound(lead_id.to_string()))?;
        if let Some(reason) = skip_reason(&lead) {
            self.skip_lead(&lead, reason)?;
            return Ok(LeadOutcome::NoCall);
        }
        let started_at = self.ctx.clock.now();

        match self.place(&lead).await {
            Placement::Finished { call_id, result } => {
                self.settle_call(lead, call_id, result, started_at)?
            }
            Placement::Failed { call_id, error } => {
                self.settle_failure(lead, call_id, error.to_string(), started_at)?
            }
            Placement::Interrupted => {
                info!(
                    job_id = %self.job_id,
                    lead_id,
                    "Shutdown during call; lead left in progress for recovery"
                );
                return Ok(LeadOutcome::Interrupted);
            }
        }
        Ok(LeadOutcome::Called)
    }

    /// Release a claimed lead without calling it
    fn skip_lead(&self, lead: &LeadEntry, reason: &str) -> StoreResult<()> {
        let store = self.ctx.store.as_ref();
        store.finish_claim(&lead.id, ClaimState::Skipped)?;
        self.slot.update(store, |job| job.counters.skipped())?;

        info!(
            job_id = %self.job_id,
            lead_id = %lead.id,
            lead_status = %lead.status,
            reason,
            "Lead left for a human; not dialed"
        );
        self.ctx.bus.publish(DialerEvent::LeadSkipped {
            job_id: self.job_id.clone(),
            lead_id: lead.id.clone(),
            lead_status: lead.status,
            reason: reason.to_string(),
            timestamp: self.ctx.clock.now(),
        });
        Ok(())
    }

    /// Place the call and await its terminal result, both under one timeout
    async fn place(&self, lead: &LeadEntry) -> Placement {
        let timeout_secs = self.ctx.config.placement_timeout_secs;
        let mut placed: Option<CallId> = None;

        let call = async {
            let CallHandle { call_id, result } = self.ctx.placer.place_call(lead).await?;
            placed = Some(call_id.clone());
            info!(job_id = %self.job_id, lead_id = %lead.id, %call_id, "Call placed");
            self.ctx.bus.publish(DialerEvent::CallStarted {
                job_id: self.job_id.clone(),
                lead_id: lead.id.clone(),
                call_id: call_id.clone(),
                timestamp: self.ctx.clock.now(),
            });
            let result = result.await.map_err(|_| PlacementError::ResultLost {
                call_id: call_id.clone(),
            })?;
            Ok::<_, PlacementError>((call_id, result))
        };

        let outcome = tokio::select! {
            biased;
            _ = self.ctx.shutdown.cancelled() => return Placement::Interrupted,
            outcome = tokio::time::timeout(self.ctx.config.placement_timeout(), call) => outcome,
        };

        match outcome {
            Ok(Ok((call_id, result))) => Placement::Finished { call_id, result },
            Ok(Err(error)) => Placement::Failed {
                call_id: placed,
                error,
            },
            Err(_) => Placement::Failed {
                call_id: placed,
                error: PlacementError::Timeout(timeout_secs),
            },
        }
    }

    /// Apply a terminal call result to the lead, the attempt log and the job
    fn settle_call(
        &self,
        mut lead: LeadEntry,
        call_id: CallId,
        result: CallResult,
        started_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let store = self.ctx.store.as_ref();
        let now = self.ctx.clock.now();
        let mut turned_hot = false;

        let claim = match result.status {
            CallResultStatus::NoAnswer | CallResultStatus::Busy => {
                let decision = self.ctx.retry.decide(&lead, now);
                self.ctx
                    .retry
                    .apply(&mut lead, &decision, result.status.as_str(), now);
                info!(
                    job_id = %self.job_id,
                    lead_id = %lead.id,
                    action = %decision.action,
                    retry_count = decision.retry_count,
                    "Retry scheduled"
                );
                self.ctx.bus.publish(DialerEvent::RetryScheduled {
                    job_id: self.job_id.clone(),
                    lead_id: lead.id.clone(),
                    decision,
                    timestamp: now,
                });
                ClaimState::Completed
            }
            CallResultStatus::Completed => {
                let report = self
                    .ctx
                    .scorer
                    .score_transcript(&result.transcript, result.duration_secs);
                lead.apply_scored_status(report.status);
                turned_hot = report.status == LeadStatus::Hot;
                ClaimState::Completed
            }
            CallResultStatus::Failed => ClaimState::Failed,
        };

        lead.last_call_at = Some(now);
        self.keep_hot(&mut lead)?;
        store.update_lead(&lead)?;
        store.record_attempt(&CallAttempt::new(
            &lead.id,
            &self.job_id,
            Some(call_id.clone()),
            started_at,
            now,
            result.duration_secs,
            result.status,
        ))?;
        store.finish_claim(&lead.id, claim)?;
        self.end_live(&call_id);
        self.slot.update(store, |job| {
            job.counters.finished(claim == ClaimState::Completed)
        })?;

        info!(
            job_id = %self.job_id,
            lead_id = %lead.id,
            %call_id,
            result = %result.status,
            lead_status = %lead.status,
            "Call ended"
        );
        self.ctx.bus.publish(DialerEvent::CallEnded {
            job_id: self.job_id.clone(),
            lead_id: lead.id.clone(),
            call_id: call_id.clone(),
            result: result.status,
            duration_secs: result.duration_secs,
            lead_status: lead.status,
            timestamp: now,
        });

        if claim == ClaimState::Failed {
            warn!(job_id = %self.job_id, lead_id = %lead.id, %call_id, "Call failed");
            self.ctx.bus.publish(DialerEvent::CallFailed {
                job_id: self.job_id.clone(),
                lead_id: lead.id.clone(),
                call_id: Some(call_id),
                error: "call service reported failure".to_string(),
                timestamp: now,
            });
        }

        if turned_hot && self.pause(PauseReason::HotLead { lead_id: lead.id.clone() })? {
            info!(job_id = %self.job_id, lead_id = %lead.id, "Lead turned hot; batch paused");
        }
        Ok(())
    }

    /// Placement error or timeout: mark the lead failed and move on
    fn settle_failure(
        &self,
        mut lead: LeadEntry,
        call_id: Option<CallId>,
        error: String,
        started_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let store = self.ctx.store.as_ref();
        let now = self.ctx.clock.now();
        warn!(job_id = %self.job_id, lead_id = %lead.id, error = %error, "Call placement failed");

        lead.last_call_at = Some(now);
        self.keep_hot(&mut lead)?;
        store.update_lead(&lead)?;
        store.record_attempt(&CallAttempt::new(
            &lead.id,
            &self.job_id,
            call_id.clone(),
            started_at,
            now,
            0,
            CallResultStatus::Failed,
        ))?;
        store.finish_claim(&lead.id, ClaimState::Failed)?;
        if let Some(ref id) = call_id {
            self.end_live(id);
        }
        self.slot.update(store, |job| job.counters.finished(false))?;

        self.ctx.bus.publish(DialerEvent::CallFailed {
            job_id: self.job_id.clone(),
            lead_id: lead.id,
            call_id,
            error,
            timestamp: now,
        });
        Ok(())
    }

    /// A lead marked hot while its call was in flight stays hot
    fn keep_hot(&self, lead: &mut LeadEntry) -> StoreResult<()> {
        if lead.status == LeadStatus::Hot {
            return Ok(());
        }
        if let Some(current) = self.ctx.store.lead(&lead.id)? {
            if current.status == LeadStatus::Hot {
                debug!(job_id = %self.job_id, lead_id = %lead.id, "Keeping externally set hot status");
                lead.apply_scored_status(LeadStatus::Hot);
            }
        }
        Ok(())
    }

    fn end_live(&self, call_id: &str) {
        if let Err(e) = self.ctx.monitor.end(call_id) {
            warn!(call_id, error = %e, "Failed to discard live call state");
        }
    }

    fn advance_cursor(&self, next: usize) -> StoreResult<()> {
        let store = self.ctx.store.as_ref();
        let progress = self.slot.with_job(|job| -> StoreResult<_> {
            store.advance_cursor(&job.id, next)?;
            job.cursor = next;
            Ok(job.progress())
        })??;

        debug!(job_id = %self.job_id, cursor = next, total = progress.total, "Cursor advanced");
        self.ctx.bus.publish(DialerEvent::BatchProgress {
            job_id: progress.job_id,
            cursor: progress.cursor,
            total: progress.total,
            counters: progress.counters,
            timestamp: self.ctx.clock.now(),
        });
        Ok(())
    }

    /// Inter-call pacing. Returns `false` if the job was stopped meanwhile.
    async fn pace(&self) -> bool {
        let delay = self.ctx.config.pacing_delay();
        if delay.is_zero() {
            return !self.slot.stop.is_cancelled();
        }
        tokio::select! {
            _ = self.slot.stop.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// After the cursor reaches the end: sweep leftover Pending leads, wait out
    /// foreign claims, then complete.
    async fn finish(&self) -> StoreResult<()> {
        let store = self.ctx.store.as_ref();
        loop {
            if !self.wait_until_runnable().await? {
                return Ok(());
            }

            let states = store.claim_states(&self.leads)?;
            let pending: Vec<&LeadId> = self
                .leads
                .iter()
                .filter(|id| states.get(*id) == Some(&ClaimState::Pending))
                .collect();
            let in_progress = states
                .values()
                .filter(|state| **state == ClaimState::InProgress)
                .count();

            if pending.is_empty() && in_progress == 0 {
                if self.complete()? {
                    return Ok(());
                }
                continue;
            }

            if pending.is_empty() {
                debug!(job_id = %self.job_id, in_progress, "Waiting for outstanding claims");
                tokio::select! {
                    _ = self.slot.stop.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(self.ctx.config.pause_poll_interval()) => {}
                }
                continue;
            }

            debug!(job_id = %self.job_id, count = pending.len(), "Sweeping leftover pending leads");
            for lead_id in pending {
                if !self.wait_until_runnable().await? {
                    return Ok(());
                }
                if !self.window_open()? {
                    break;
                }
                let outcome = self.process_lead(lead_id).await?;
                if outcome == LeadOutcome::Interrupted {
                    return Ok(());
                }
                if outcome == LeadOutcome::Called && !self.pace().await {
                    return Ok(());
                }
            }
        }
    }

    /// Running → Completed. Returns `false` if the job is no longer Running.
    fn complete(&self) -> StoreResult<bool> {
        let now = self.ctx.clock.now();
        let completed = self.try_transition(|job| {
            job.advance(BatchState::Completed, None, now)?;
            Ok(())
        })?;
        let Some(((), job)) = completed else {
            return Ok(false);
        };
        info!(
            job_id = %job.id,
            completed = job.counters.completed,
            failed = job.counters.failed,
            "Batch completed"
        );
        self.ctx.bus.publish(DialerEvent::BatchCompleted {
            job_id: job.id,
            counters: job.counters,
            timestamp: now,
        });
        Ok(true)
    }

    /// Transition helper for the runner: rejected transitions are races with
    /// operator commands and are skipped, store failures propagate.
    fn try_transition<T>(
        &self,
        f: impl FnOnce(&mut BatchJob) -> CommandResult<T>,
    ) -> StoreResult<Option<(T, BatchJob)>> {
        let mut out = None;
        let result = self.slot.transition(self.ctx.store.as_ref(), |job| {
            out = Some(f(job)?);
            Ok(())
        });
        match result {
            Ok(job) => Ok(out.map(|value| (value, job))),
            Err(CommandError::Store(e)) => Err(e),
            Err(e) => {
                debug!(job_id = %self.job_id, error = %e, "Runner transition skipped");
                Ok(None)
            }
        }
    }
}
