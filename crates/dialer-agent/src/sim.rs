//! Simulated collaborators for demo runs
//!
//! `SimulatedPlacer` stands in for the calling service: it cycles through a
//! configured list of outcomes and, for answered calls, streams the transcript
//! into the live monitor one sentence at a time before reporting the result.
//! `KeywordScorer` stands in for the scoring service with regex rules.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use dialer::monitor::MonitorError;
use dialer::{
    CallHandle, CallPlacer, CallResult, CallResultStatus, Emotion, LeadEntry, LeadStatus,
    Objection, PlacementError, ScoreReport, SharedLiveMonitor, TranscriptScorer, Urgency,
};

/// Outcome of one simulated call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimOutcome {
    Answer,
    NoAnswer,
    Busy,
    /// The call connects but the service reports a failure
    Fail,
    /// The service refuses to place the call
    Reject,
}

/// Behaviour of the simulated call service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Outcome of the n-th placed call, cycled
    pub outcomes: Vec<SimOutcome>,
    /// Transcript of the n-th answered call, cycled
    pub transcripts: Vec<String>,
    /// Gap between two streamed transcript sentences
    pub chunk_interval_ms: u64,
    /// How long an unanswered call rings
    pub ring_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            outcomes: vec![
                SimOutcome::Answer,
                SimOutcome::NoAnswer,
                SimOutcome::Answer,
                SimOutcome::Busy,
                SimOutcome::Answer,
                SimOutcome::Reject,
            ],
            transcripts: vec![
                "Hi, yes I have a minute. I'm not sure this is for me. It sounds too expensive. Call me back later.".to_string(),
                "Hello. That sounds interesting. Can you send me the details this week?".to_string(),
                "Who is this? I'm really frustrated with these calls. I don't trust this and it is too expensive.".to_string(),
                "Yes, I saw the offer. I need this today. Send the contract and I will sign up.".to_string(),
            ],
            chunk_interval_ms: 400,
            ring_ms: 1_500,
        }
    }
}

/// Calling service stand-in
pub struct SimulatedPlacer {
    config: SimulationConfig,
    monitor: SharedLiveMonitor,
    placed: AtomicUsize,
    answered: AtomicUsize,
}

impl SimulatedPlacer {
    pub fn new(config: SimulationConfig, monitor: SharedLiveMonitor) -> Self {
        Self {
            config,
            monitor,
            placed: AtomicUsize::new(0),
            answered: AtomicUsize::new(0),
        }
    }

    /// Calls placed so far, rejected ones included
    pub fn placed(&self) -> usize {
        self.placed.load(Ordering::SeqCst)
    }

    fn next_transcript(&self) -> String {
        let n = self.answered.fetch_add(1, Ordering::SeqCst);
        match self.config.transcripts.len() {
            0 => String::new(),
            len => self.config.transcripts[n % len].clone(),
        }
    }
}

#[async_trait]
impl CallPlacer for SimulatedPlacer {
    async fn place_call(&self, lead: &LeadEntry) -> Result<CallHandle, PlacementError> {
        let n = self.placed.fetch_add(1, Ordering::SeqCst);
        let outcome = match self.config.outcomes.len() {
            0 => SimOutcome::Answer,
            len => self.config.outcomes[n % len],
        };
        let call_id = format!("sim-{}-{}", lead.id, n + 1);
        debug!(lead_id = %lead.id, %call_id, ?outcome, "Simulated call");

        let ring = Duration::from_millis(self.config.ring_ms);
        let (handle, tx) = CallHandle::channel(call_id.clone());
        match outcome {
            SimOutcome::Reject => {
                return Err(PlacementError::Rejected {
                    lead_id: lead.id.clone(),
                    reason: "simulated carrier rejection".to_string(),
                })
            }
            SimOutcome::NoAnswer => spawn_missed(tx, ring, CallResultStatus::NoAnswer),
            SimOutcome::Busy => spawn_missed(tx, ring, CallResultStatus::Busy),
            SimOutcome::Fail => spawn_missed(tx, ring, CallResultStatus::Failed),
            SimOutcome::Answer => {
                tokio::spawn(stream_call(
                    self.monitor.clone(),
                    call_id,
                    lead.id.clone(),
                    self.next_transcript(),
                    Duration::from_millis(self.config.chunk_interval_ms),
                    tx,
                ));
            }
        }
        Ok(handle)
    }
}

fn spawn_missed(tx: oneshot::Sender<CallResult>, ring: Duration, status: CallResultStatus) {
    tokio::spawn(async move {
        tokio::time::sleep(ring).await;
        let _ = tx.send(CallResult::missed(status));
    });
}

async fn stream_call(
    monitor: SharedLiveMonitor,
    call_id: String,
    lead_id: String,
    transcript: String,
    interval: Duration,
    tx: oneshot::Sender<CallResult>,
) {
    let sentences = split_sentences(&transcript);
    for sentence in &sentences {
        tokio::time::sleep(interval).await;
        match monitor.ingest(&call_id, &lead_id, sentence) {
            Ok(_) => {}
            Err(MonitorError::CallEnded { .. }) => {
                debug!(%call_id, "Call already settled; transcript stream closed");
                return;
            }
            Err(e) => warn!(%call_id, error = %e, "Live monitor rejected chunk"),
        }
    }
    let elapsed = interval.saturating_mul(sentences.len() as u32);
    let duration_secs = u32::try_from(elapsed.as_secs()).unwrap_or(u32::MAX);
    let _ = tx.send(CallResult::completed(duration_secs, transcript));
}

/// Split a transcript into sentence-sized chunks
pub fn split_sentences(transcript: &str) -> Vec<&str> {
    transcript
        .split_inclusive(&['.', '!', '?'][..])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Scoring service stand-in: case-insensitive keyword rules
pub struct KeywordScorer {
    hot: Regex,
    warm: Regex,
    frustrated: Regex,
    hesitant: Regex,
    positive: Regex,
    urgent: Regex,
    soon: Regex,
    objections: Vec<(Objection, Regex)>,
}

impl KeywordScorer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            hot: Regex::new(r"(?i)\b(sign up|send the contract|ready to buy)\b")?,
            warm: Regex::new(r"(?i)\b(interesting|interested|send me the details|tell me more)\b")?,
            frustrated: Regex::new(r"(?i)\b(frustrated|annoyed|stop calling|waste of time)\b")?,
            hesitant: Regex::new(r"(?i)\b(not sure|maybe|i don't know)\b")?,
            positive: Regex::new(r"(?i)\b(great|sounds good|perfect)\b")?,
            urgent: Regex::new(r"(?i)\b(today|right now|asap|urgent)\b")?,
            soon: Regex::new(r"(?i)\b(this week|soon)\b")?,
            objections: vec![
                (Objection::Price, Regex::new(r"(?i)\b(expensive|price|cost)")?),
                (Objection::Trust, Regex::new(r"(?i)\b(don't trust|scam|who is this)\b")?),
                (
                    Objection::Timing,
                    Regex::new(r"(?i)\b(call me back later|not a good time)\b")?,
                ),
                (
                    Objection::Need,
                    Regex::new(r"(?i)\b(don't need|not interested|not for me)\b")?,
                ),
                (
                    Objection::Competitor,
                    Regex::new(r"(?i)\b(already (have|use)|another provider)\b")?,
                ),
            ],
        })
    }
}

impl TranscriptScorer for KeywordScorer {
    fn score_transcript(&self, transcript: &str, _duration_secs: u32) -> ScoreReport {
        let objections: BTreeSet<Objection> = self
            .objections
            .iter()
            .filter(|(_, pattern)| pattern.is_match(transcript))
            .map(|(objection, _)| *objection)
            .collect();

        let status = if self.hot.is_match(transcript) {
            LeadStatus::Hot
        } else if self.warm.is_match(transcript) && !objections.contains(&Objection::Need) {
            LeadStatus::Warm
        } else {
            LeadStatus::Cold
        };

        let emotion = if self.frustrated.is_match(transcript) {
            Emotion::Frustrated
        } else if self.hesitant.is_match(transcript) {
            Emotion::Hesitant
        } else if self.positive.is_match(transcript) {
            Emotion::Positive
        } else {
            Emotion::Neutral
        };

        let urgency = if self.urgent.is_match(transcript) {
            Urgency::High
        } else if self.soon.is_match(transcript) {
            Urgency::Medium
        } else {
            Urgency::Low
        };

        ScoreReport {
            status,
            emotion,
            urgency,
            objections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use dialer::{EventBus, LiveCallMonitor, ManualClock, RiskLevel};
    use std::sync::Arc;

    fn scorer() -> KeywordScorer {
        KeywordScorer::new().unwrap()
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("Hi there. Is this a good time?  Yes! "),
            vec!["Hi there.", "Is this a good time?", "Yes!"]
        );
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_scorer_statuses() {
        let s = scorer();
        assert_eq!(
            s.score_transcript("Great, send the contract", 60).status,
            LeadStatus::Hot
        );
        assert_eq!(
            s.score_transcript("That sounds interesting", 60).status,
            LeadStatus::Warm
        );
        assert_eq!(
            s.score_transcript("Interesting, but I'm not interested", 60).status,
            LeadStatus::Cold
        );
    }

    #[test]
    fn test_scorer_emotion_urgency_objections() {
        let report = scorer().score_transcript(
            "Who is this? I'm really frustrated, it is too expensive and I need it today",
            30,
        );
        assert_eq!(report.emotion, Emotion::Frustrated);
        assert_eq!(report.urgency, Urgency::High);
        assert_eq!(
            report.objections,
            [Objection::Price, Objection::Trust]
                .into_iter()
                .collect::<BTreeSet<_>>()
        );
    }

    fn monitor() -> SharedLiveMonitor {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()).shared();
        LiveCallMonitor::new(
            Arc::new(scorer()),
            EventBus::new().shared(),
            clock,
        )
        .shared()
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_call_streams_transcript() {
        let monitor = monitor();
        let config = SimulationConfig {
            outcomes: vec![SimOutcome::Answer],
            transcripts: vec!["Who is this? I'm annoyed. Too expensive.".to_string()],
            chunk_interval_ms: 100,
            ring_ms: 10,
        };
        let placer = SimulatedPlacer::new(config, monitor.clone());
        let lead = LeadEntry::new("l1", "c1", "+1", LeadStatus::Cold);

        let handle = placer.place_call(&lead).await.unwrap();
        assert_eq!(handle.call_id, "sim-l1-1");

        tokio::time::sleep(Duration::from_millis(250)).await;
        let state = monitor.get_state("sim-l1-1").unwrap().unwrap();
        assert_eq!(state.transcript_chunks, vec!["Who is this?", "I'm annoyed."]);

        let result = handle.result.await.unwrap();
        assert_eq!(result.status, CallResultStatus::Completed);
        assert_eq!(
            monitor.get_state("sim-l1-1").unwrap().unwrap().risk_level,
            RiskLevel::High
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_stops_after_call_is_settled() {
        let monitor = monitor();
        let config = SimulationConfig {
            outcomes: vec![SimOutcome::Answer],
            transcripts: vec!["One. Two. Three. Four.".to_string()],
            chunk_interval_ms: 100,
            ring_ms: 10,
        };
        let placer = SimulatedPlacer::new(config, monitor.clone());
        let lead = LeadEntry::new("l1", "c1", "+1", LeadStatus::Cold);

        let handle = placer.place_call(&lead).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(monitor.active_calls().unwrap(), vec!["sim-l1-1"]);

        // The dialer gave up on the call (placement timeout)
        monitor.end("sim-l1-1").unwrap();
        assert!(handle.result.await.is_err());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(monitor.active_calls().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_cycle() {
        let config = SimulationConfig {
            outcomes: vec![SimOutcome::Busy, SimOutcome::Reject],
            ..Default::default()
        };
        let placer = SimulatedPlacer::new(config, monitor());
        let lead = LeadEntry::new("l1", "c1", "+1", LeadStatus::Cold);

        let busy = placer.place_call(&lead).await.unwrap();
        assert_eq!(busy.result.await.unwrap().status, CallResultStatus::Busy);
        assert!(matches!(
            placer.place_call(&lead).await,
            Err(PlacementError::Rejected { .. })
        ));
        let again = placer.place_call(&lead).await.unwrap();
        assert_eq!(again.call_id, "sim-l1-3");
        assert_eq!(placer.placed(), 3);
    }
}
