//! Live call state
//!
//! One entry per active call, created on the first transcript chunk and
//! dropped when the call ends. Ingestion never awaits: scoring is synchronous
//! and publishing to the bus never blocks.
//!
//! Ended call ids are remembered (up to [`ENDED_CALL_MEMORY`] of them) so a
//! chunk that arrives after hang-up cannot bring a call back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::risk::{assess_risk, suggestions_for, RiskLevel};
use crate::clock::SharedClock;
use crate::collab::{Emotion, Objection, SharedScorer, Urgency};
use crate::events::{DialerEvent, SharedEventBus};
use crate::model::{CallId, LeadId};

/// Errors from the live monitor
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Call {call_id} belongs to lead {expected}, not {got}")]
    LeadMismatch {
        call_id: CallId,
        expected: LeadId,
        got: LeadId,
    },

    #[error("Call {call_id} has already ended")]
    CallEnded { call_id: CallId },

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// How many ended call ids the monitor remembers
pub const ENDED_CALL_MEMORY: usize = 4096;

/// Streaming state of one active call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveCallState {
    pub call_id: CallId,
    pub lead_id: LeadId,
    pub transcript_chunks: Vec<String>,
    pub emotion: Emotion,
    pub urgency: Urgency,
    pub detected_objections: BTreeSet<Objection>,
    pub risk_level: RiskLevel,
    /// Suggestion keys already surfaced, in order
    pub suggestions: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub last_update_at: DateTime<Utc>,
}

impl LiveCallState {
    fn new(call_id: &str, lead_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            call_id: call_id.to_string(),
            lead_id: lead_id.to_string(),
            transcript_chunks: Vec::new(),
            emotion: Emotion::Neutral,
            urgency: Urgency::Low,
            detected_objections: BTreeSet::new(),
            risk_level: RiskLevel::Low,
            suggestions: Vec::new(),
            started_at: now,
            last_update_at: now,
        }
    }

    pub fn transcript(&self) -> String {
        self.transcript_chunks.join(" ")
    }

    pub fn duration_secs(&self) -> u32 {
        let secs = (self.last_update_at - self.started_at).num_seconds();
        u32::try_from(secs.max(0)).unwrap_or(u32::MAX)
    }
}

/// Shared reference to LiveCallMonitor
pub type SharedLiveMonitor = Arc<LiveCallMonitor>;

#[derive(Default)]
struct Registry {
    calls: HashMap<CallId, LiveCallState>,
    ended: HashSet<CallId>,
    ended_order: VecDeque<CallId>,
}

impl Registry {
    fn tombstone(&mut self, call_id: &str) {
        if !self.ended.insert(call_id.to_string()) {
            return;
        }
        self.ended_order.push_back(call_id.to_string());
        while self.ended_order.len() > ENDED_CALL_MEMORY {
            if let Some(oldest) = self.ended_order.pop_front() {
                self.ended.remove(&oldest);
            }
        }
    }
}

/// Registry of active calls
pub struct LiveCallMonitor {
    registry: Mutex<Registry>,
    scorer: SharedScorer,
    bus: SharedEventBus,
    clock: SharedClock,
}

impl LiveCallMonitor {
    pub fn new(scorer: SharedScorer, bus: SharedEventBus, clock: SharedClock) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            scorer,
            bus,
            clock,
        }
    }

    /// Create a shared reference to this monitor
    pub fn shared(self) -> SharedLiveMonitor {
        Arc::new(self)
    }

    /// Append a transcript chunk and recompute the call's risk.
    ///
    /// Blank chunks are ignored. Chunks for a call that already ended are
    /// rejected with [`MonitorError::CallEnded`]. Returns the risk level after
    /// this chunk.
    pub fn ingest(
        &self,
        call_id: &str,
        lead_id: &str,
        chunk: &str,
    ) -> Result<RiskLevel, MonitorError> {
        let chunk = chunk.trim();
        let now = self.clock.now();

        let (events, risk) = {
            let mut registry = self.lock()?;
            if registry.ended.contains(call_id) {
                debug!(call_id, lead_id, "Chunk after call end dropped");
                return Err(MonitorError::CallEnded {
                    call_id: call_id.to_string(),
                });
            }
            if chunk.is_empty() {
                let risk = registry
                    .calls
                    .get(call_id)
                    .map(|state| state.risk_level)
                    .unwrap_or(RiskLevel::Low);
                return Ok(risk);
            }

            let state = registry
                .calls
                .entry(call_id.to_string())
                .or_insert_with(|| LiveCallState::new(call_id, lead_id, now));
            if state.lead_id != lead_id {
                return Err(MonitorError::LeadMismatch {
                    call_id: call_id.to_string(),
                    expected: state.lead_id.clone(),
                    got: lead_id.to_string(),
                });
            }

            state.transcript_chunks.push(chunk.to_string());
            state.last_update_at = now;

            let report = self
                .scorer
                .score_transcript(&state.transcript(), state.duration_secs());
            let assessment = assess_risk(report.emotion, report.urgency, &report.objections);

            if assessment.level != state.risk_level {
                debug!(
                    call_id,
                    from = %state.risk_level,
                    to = %assessment.level,
                    "Live risk changed"
                );
            }
            state.emotion = report.emotion;
            state.urgency = report.urgency;
            state.detected_objections = report.objections;
            state.risk_level = assessment.level;

            let mut events = vec![DialerEvent::LiveUpdate {
                call_id: state.call_id.clone(),
                lead_id: state.lead_id.clone(),
                emotion: state.emotion,
                urgency: state.urgency,
                objections: state.detected_objections.clone(),
                risk_level: state.risk_level,
                chunk_count: state.transcript_chunks.len(),
                timestamp: now,
            }];

            if assessment.level >= RiskLevel::Medium {
                let recommended_action = assessment.recommended_action();
                if recommended_action.is_some() {
                    warn!(call_id, lead_id, "High live risk; human handoff recommended");
                }
                events.push(DialerEvent::LiveRisk {
                    call_id: state.call_id.clone(),
                    lead_id: state.lead_id.clone(),
                    risk_level: assessment.level,
                    reason: assessment.reason,
                    recommended_action,
                    timestamp: now,
                });
            }

            for suggestion in suggestions_for(state.emotion, &state.detected_objections) {
                if state.suggestions.contains(&suggestion.key) {
                    continue;
                }
                state.suggestions.push(suggestion.key.clone());
                events.push(DialerEvent::LiveSuggestion {
                    call_id: state.call_id.clone(),
                    lead_id: state.lead_id.clone(),
                    key: suggestion.key,
                    text: suggestion.text,
                    timestamp: now,
                });
            }

            (events, state.risk_level)
        };

        for event in events {
            self.bus.publish(event);
        }
        Ok(risk)
    }

    pub fn get_state(&self, call_id: &str) -> Result<Option<LiveCallState>, MonitorError> {
        Ok(self.lock()?.calls.get(call_id).cloned())
    }

    /// Discard a call's state and refuse further chunks for it. Returns the
    /// final state, if the call had any chunks.
    pub fn end(&self, call_id: &str) -> Result<Option<LiveCallState>, MonitorError> {
        let ended = {
            let mut registry = self.lock()?;
            registry.tombstone(call_id);
            registry.calls.remove(call_id)
        };
        if let Some(ref state) = ended {
            info!(
                call_id,
                lead_id = %state.lead_id,
                chunks = state.transcript_chunks.len(),
                final_risk = %state.risk_level,
                "Live call ended"
            );
        }
        Ok(ended)
    }

    /// IDs of calls with live state, sorted
    pub fn active_calls(&self) -> Result<Vec<CallId>, MonitorError> {
        let mut ids: Vec<CallId> = self.lock()?.calls.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Registry>, MonitorError> {
        self.registry.lock().map_err(|_| MonitorError::LockPoisoned)
    }
}
