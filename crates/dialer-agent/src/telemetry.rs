//! Event telemetry for agent runs.
//!
//! The sink sees every bus event: it logs each one with structured fields and
//! folds them into a [`RunSummary`], written as pretty JSON when the run ends.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use dialer::{BatchCounters, BatchJob, BatchState, DialerEvent, PauseReason, RiskLevel};

/// What happened during one agent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub campaign_id: String,
    pub job_id: Option<String>,
    pub final_state: Option<BatchState>,
    pub cursor: usize,
    pub total: usize,
    pub counters: BatchCounters,
    pub calls_started: usize,
    pub calls_ended: usize,
    pub calls_failed: usize,
    pub retries_scheduled: usize,
    /// Snapshot leads claimed but left for a human
    pub leads_skipped: usize,
    pub pauses: Vec<PauseReason>,
    /// Calls that reached high live risk, in order of first alert
    pub high_risk_calls: Vec<String>,
    pub suggestions: usize,
    pub events_seen: usize,
    /// Events the sink lost to bus lag
    pub events_missed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run summary {}", path.display()))?;
        info!(path = %path.display(), "Wrote run summary");
        Ok(())
    }
}

/// Logs bus events and accumulates a run summary
pub struct TelemetrySink {
    summary: RunSummary,
}

impl TelemetrySink {
    pub fn new(campaign_id: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            summary: RunSummary {
                campaign_id: campaign_id.to_string(),
                job_id: None,
                final_state: None,
                cursor: 0,
                total: 0,
                counters: BatchCounters::default(),
                calls_started: 0,
                calls_ended: 0,
                calls_failed: 0,
                retries_scheduled: 0,
                leads_skipped: 0,
                pauses: Vec::new(),
                high_risk_calls: Vec::new(),
                suggestions: 0,
                events_seen: 0,
                events_missed: 0,
                started_at,
                finished_at: None,
            },
        }
    }

    pub fn record(&mut self, event: &DialerEvent) {
        let s = &mut self.summary;
        s.events_seen += 1;

        match event {
            DialerEvent::BatchStarted {
                job_id,
                campaign_id,
                total_leads,
                ..
            } => info!(%job_id, %campaign_id, total_leads, "batch started"),
            DialerEvent::BatchProgress {
                job_id,
                cursor,
                total,
                ..
            } => debug!(%job_id, cursor, total, "batch progress"),
            DialerEvent::BatchPaused { job_id, reason, .. } => {
                info!(%job_id, %reason, "batch paused");
                s.pauses.push(reason.clone());
            }
            DialerEvent::BatchResumed {
                job_id, automatic, ..
            } => info!(%job_id, automatic, "batch resumed"),
            DialerEvent::BatchCompleted {
                job_id, counters, ..
            } => info!(
                %job_id,
                completed = counters.completed,
                failed = counters.failed,
                "batch completed"
            ),
            DialerEvent::BatchStopped {
                job_id, stopped_by, ..
            } => info!(%job_id, %stopped_by, "batch stopped"),
            DialerEvent::BatchSkippedOutsideWindow {
                job_id,
                next_window_start,
                ..
            } => info!(%job_id, %next_window_start, "outside call window"),
            DialerEvent::CallStarted {
                lead_id, call_id, ..
            } => {
                s.calls_started += 1;
                info!(%lead_id, %call_id, "call started");
            }
            DialerEvent::CallEnded {
                lead_id,
                call_id,
                result,
                duration_secs,
                lead_status,
                ..
            } => {
                s.calls_ended += 1;
                info!(%lead_id, %call_id, %result, duration_secs, %lead_status, "call ended");
            }
            DialerEvent::CallFailed {
                lead_id, error, ..
            } => {
                s.calls_failed += 1;
                warn!(%lead_id, %error, "call failed");
            }
            DialerEvent::RetryScheduled {
                lead_id, decision, ..
            } => {
                s.retries_scheduled += 1;
                info!(
                    %lead_id,
                    action = %decision.action,
                    retry_count = decision.retry_count,
                    "retry scheduled"
                );
            }
            DialerEvent::LeadSkipped {
                lead_id,
                lead_status,
                reason,
                ..
            } => {
                s.leads_skipped += 1;
                info!(%lead_id, %lead_status, %reason, "lead skipped");
            }
            DialerEvent::LiveUpdate {
                call_id,
                risk_level,
                chunk_count,
                ..
            } => debug!(%call_id, %risk_level, chunk_count, "live update"),
            DialerEvent::LiveRisk {
                call_id,
                risk_level,
                reason,
                ..
            } => {
                warn!(%call_id, %risk_level, reason = ?reason, "live risk");
                if *risk_level == RiskLevel::High && !s.high_risk_calls.contains(call_id) {
                    s.high_risk_calls.push(call_id.clone());
                }
            }
            DialerEvent::LiveSuggestion { call_id, key, .. } => {
                s.suggestions += 1;
                info!(%call_id, %key, "live suggestion");
            }
        }
    }

    /// Close the summary with the job's final record
    pub fn finish(
        mut self,
        job: Option<&BatchJob>,
        events_missed: u64,
        finished_at: DateTime<Utc>,
    ) -> RunSummary {
        if let Some(job) = job {
            self.summary.job_id = Some(job.id.clone());
            self.summary.final_state = Some(job.state);
            self.summary.cursor = job.cursor;
            self.summary.total = job.total();
            self.summary.counters = job.counters;
        }
        self.summary.events_missed = events_missed;
        self.summary.finished_at = Some(finished_at);
        self.summary
    }
}
