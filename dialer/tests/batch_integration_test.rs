//! End-to-end batch runs against scripted calling and scoring collaborators.
//!
//! Tokio time is paused, so pacing delays, placement timeouts and paused-wait
//! polls all elapse instantly; the calendar clock only moves when a test sets it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::oneshot;

use dialer::{
    BatchState, CallHandle, CallPlacer, CallResult, CallResultStatus, CampaignOrchestrator,
    ClaimState, Collaborators, CommandError, DialerConfig, DialerEvent, DialerStore, EventBus,
    EventFilter, FilteredReceiver, LeadEntry, LeadStatus, LiveCallMonitor, ManualClock,
    MemoryStore, PauseReason, PlacementError, ScoreReport, SharedEventBus, TranscriptScorer,
};

const CAMPAIGN: &str = "spring-promo";

/// What the fake calling service does for a lead
#[derive(Clone)]
enum Script {
    Answer(&'static str),
    Missed(CallResultStatus),
    Reject,
    /// Result delivered later by the test via `release`
    Hold,
}

struct ScriptedPlacer {
    scripts: HashMap<String, Script>,
    placed: Mutex<Vec<String>>,
    held: Mutex<HashMap<String, oneshot::Sender<CallResult>>>,
}

impl ScriptedPlacer {
    fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
        Arc::new(Self {
            scripts: scripts
                .iter()
                .map(|(id, script)| (id.to_string(), script.clone()))
                .collect(),
            placed: Mutex::new(Vec::new()),
            held: Mutex::new(HashMap::new()),
        })
    }

    fn placed(&self) -> Vec<String> {
        self.placed.lock().unwrap().clone()
    }

    fn release(&self, lead_id: &str, result: CallResult) {
        let sender = self.held.lock().unwrap().remove(lead_id).unwrap();
        sender.send(result).unwrap();
    }
}

#[async_trait]
impl CallPlacer for ScriptedPlacer {
    async fn place_call(&self, lead: &LeadEntry) -> Result<CallHandle, PlacementError> {
        let attempt = {
            let mut placed = self.placed.lock().unwrap();
            placed.push(lead.id.clone());
            placed.len()
        };
        let call_id = format!("call-{}-{}", lead.id, attempt);
        let script = self
            .scripts
            .get(&lead.id)
            .cloned()
            .unwrap_or(Script::Answer("thanks, not for me"));

        match script {
            Script::Answer(transcript) => Ok(CallHandle::resolved(
                call_id,
                CallResult::completed(95, transcript),
            )),
            Script::Missed(status) => Ok(CallHandle::resolved(call_id, CallResult::missed(status))),
            Script::Reject => Err(PlacementError::Rejected {
                lead_id: lead.id.clone(),
                reason: "number unreachable".to_string(),
            }),
            Script::Hold => {
                let (handle, sender) = CallHandle::channel(call_id);
                self.held.lock().unwrap().insert(lead.id.clone(), sender);
                Ok(handle)
            }
        }
    }
}

/// Status by keyword: "hot" → Hot, "interested" → Warm, anything else → Cold
struct KeywordScorer;

impl TranscriptScorer for KeywordScorer {
    fn score_transcript(&self, transcript: &str, _duration_secs: u32) -> ScoreReport {
        let status = if transcript.contains("hot") {
            LeadStatus::Hot
        } else if transcript.contains("interested") {
            LeadStatus::Warm
        } else {
            LeadStatus::Cold
        };
        ScoreReport {
            status,
            ..Default::default()
        }
    }
}

struct Harness {
    orchestrator: CampaignOrchestrator,
    store: Arc<MemoryStore>,
    placer: Arc<ScriptedPlacer>,
    clock: Arc<ManualClock>,
    bus: SharedEventBus,
}

impl Harness {
    fn events(&self) -> FilteredReceiver {
        self.bus.subscribe_filtered(EventFilter::new()).unwrap()
    }

    fn job_state(&self, job_id: &str) -> BatchState {
        self.orchestrator.job(job_id).unwrap().state
    }

    fn claim_state(&self, lead_id: &str) -> ClaimState {
        self.store.lead(lead_id).unwrap().unwrap().claim_state
    }
}

// 2026-03-02 is a Monday; the default window is 09:00-19:00 UTC, Mon-Sat
fn monday(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
}

fn cold(id: &str) -> LeadEntry {
    LeadEntry::new(id, CAMPAIGN, format!("+4420{}", id), LeadStatus::Cold)
}

fn harness_with(
    store: Arc<MemoryStore>,
    placer: Arc<ScriptedPlacer>,
    now: DateTime<Utc>,
) -> Harness {
    let clock = ManualClock::new(now).shared();
    let bus = EventBus::new().shared();
    let monitor = LiveCallMonitor::new(Arc::new(KeywordScorer), Arc::clone(&bus), clock.clone())
        .shared();
    let orchestrator = CampaignOrchestrator::new(
        DialerConfig::default(),
        Collaborators {
            store: store.clone(),
            placer: placer.clone(),
            scorer: Arc::new(KeywordScorer),
            bus: Arc::clone(&bus),
            monitor,
            clock: clock.clone(),
        },
    )
    .unwrap();
    Harness {
        orchestrator,
        store,
        placer,
        clock,
        bus,
    }
}

fn harness(leads: Vec<LeadEntry>, scripts: &[(&str, Script)], now: DateTime<Utc>) -> Harness {
    let store = MemoryStore::new().shared();
    store.insert_leads(leads).unwrap();
    harness_with(store, ScriptedPlacer::new(scripts), now)
}

/// Receive events until one matches, failing after an hour of virtual time
async fn wait_for(
    events: &mut FilteredReceiver,
    mut matches: impl FnMut(&DialerEvent) -> bool,
) -> DialerEvent {
    tokio::time::timeout(Duration::from_secs(3600), async {
        loop {
            let event = events.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event was not published")
}

async fn wait_for_type(events: &mut FilteredReceiver, event_type: &str) -> DialerEvent {
    wait_for(events, |e| e.event_type() == event_type).await
}

#[tokio::test(start_paused = true)]
async fn test_batch_runs_to_completion() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let overdue = LeadEntry::new("c", CAMPAIGN, "+1", LeadStatus::NotPick)
        .with_retry_count(1)
        .with_last_call_at(monday(10, 0) - chrono::Duration::days(3));
    let warm = LeadEntry::new("b", CAMPAIGN, "+2", LeadStatus::Warm);
    let h = harness(
        vec![cold("a"), warm, overdue],
        &[
            ("a", Script::Answer("yes I am interested")),
            ("b", Script::Missed(CallResultStatus::NoAnswer)),
            ("c", Script::Reject),
        ],
        monday(10, 0),
    );
    let mut events = h.events();

    let job_id = h.orchestrator.start(CAMPAIGN, None, None).unwrap();
    let completed = wait_for_type(&mut events, "batch_completed").await;

    // Not-picked first, then cold, then warm
    assert_eq!(h.placer.placed(), vec!["c", "a", "b"]);

    let job = h.orchestrator.job(&job_id).unwrap();
    assert_eq!(job.state, BatchState::Completed);
    assert_eq!(job.cursor, 3);
    assert_eq!(job.counters.completed, 2);
    assert_eq!(job.counters.failed, 1);
    assert_eq!(job.counters.pending + job.counters.in_progress, 0);
    assert!(matches!(completed, DialerEvent::BatchCompleted { .. }));

    let a = h.store.lead("a").unwrap().unwrap();
    assert_eq!(a.status, LeadStatus::Warm);
    assert_eq!(a.claim_state, ClaimState::Completed);

    let b = h.store.lead("b").unwrap().unwrap();
    assert_eq!(b.status, LeadStatus::NotPick);
    assert_eq!(b.retry.retry_count, 1);
    assert_eq!(b.retry.last_retry_reason.as_deref(), Some("no_answer"));
    assert_eq!(b.retry.next_attempt_at, Some(monday(14, 0)));

    // Placement failures never enter the retry ladder
    let c = h.store.lead("c").unwrap().unwrap();
    assert_eq!(c.claim_state, ClaimState::Failed);
    assert_eq!(c.retry.retry_count, 1);

    for lead in ["a", "b", "c"] {
        assert_eq!(h.store.attempts_for_lead(lead).unwrap().len(), 1);
    }
    assert_eq!(
        h.store.attempts_for_lead("c").unwrap()[0].result_status,
        CallResultStatus::Failed
    );
}

#[tokio::test(start_paused = true)]
async fn test_pause_resume_continues_from_cursor() {
    let h = harness(
        vec![cold("l1"), cold("l2"), cold("l3"), cold("l4")],
        &[("l1", Script::Hold)],
        monday(10, 0),
    );
    let mut events = h.events();
    let job_id = h.orchestrator.start(CAMPAIGN, Some(24), Some(3)).unwrap();

    wait_for_type(&mut events, "call_started").await;
    h.orchestrator.pause(&job_id).unwrap();
    assert_eq!(h.job_state(&job_id), BatchState::Paused);

    // The call in flight still finishes and the cursor moves past it
    h.placer
        .release("l1", CallResult::completed(30, "call me next week"));
    wait_for(&mut events, |e| {
        matches!(e, DialerEvent::BatchProgress { cursor: 1, .. })
    })
    .await;

    // Several poll intervals later, still nothing new was dialed
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.placer.placed(), vec!["l1"]);
    assert_eq!(h.orchestrator.progress(&job_id).unwrap().cursor, 1);
    assert_eq!(h.claim_state("l2"), ClaimState::Pending);

    h.orchestrator.resume(&job_id).unwrap();
    wait_for_type(&mut events, "batch_completed").await;

    assert_eq!(h.placer.placed(), vec!["l1", "l2", "l3", "l4"]);
    let progress = h.orchestrator.progress(&job_id).unwrap();
    assert_eq!(progress.cursor, 4);
    assert_eq!(progress.counters.completed, 4);
}

#[tokio::test(start_paused = true)]
async fn test_outside_window_pauses_without_dialing() {
    let h = harness(vec![cold("l1"), cold("l2")], &[], monday(20, 0));
    let mut events = h.events();
    let job_id = h.orchestrator.start(CAMPAIGN, None, None).unwrap();

    let skipped = wait_for_type(&mut events, "batch_skipped_outside_window").await;
    match skipped {
        DialerEvent::BatchSkippedOutsideWindow {
            next_window_start, ..
        } => assert_eq!(
            next_window_start,
            Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap()
        ),
        other => panic!("unexpected event {other:?}"),
    }

    let job = h.orchestrator.job(&job_id).unwrap();
    assert_eq!(job.state, BatchState::Paused);
    assert_eq!(job.pause_reason, Some(PauseReason::OutsideWindow));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(h.placer.placed().is_empty());

    // Tuesday morning: the pause heals itself
    h.clock
        .set(Utc.with_ymd_and_hms(2026, 3, 3, 9, 30, 0).unwrap());
    let resumed = wait_for_type(&mut events, "batch_resumed").await;
    assert!(matches!(
        resumed,
        DialerEvent::BatchResumed {
            automatic: true,
            ..
        }
    ));
    wait_for_type(&mut events, "batch_completed").await;
    assert_eq!(h.placer.placed(), vec!["l1", "l2"]);
}

#[tokio::test(start_paused = true)]
async fn test_hot_result_pauses_batch() {
    let h = harness(
        vec![cold("a"), cold("b"), cold("c")],
        &[("a", Script::Answer("this is a hot one, send the contract"))],
        monday(11, 0),
    );
    let mut events = h.events();
    let job_id = h.orchestrator.start(CAMPAIGN, None, None).unwrap();

    let paused = wait_for_type(&mut events, "batch_paused").await;
    assert!(matches!(
        paused,
        DialerEvent::BatchPaused {
            reason: PauseReason::HotLead { ref lead_id },
            ..
        } if lead_id == "a"
    ));
    wait_for(&mut events, |e| {
        matches!(e, DialerEvent::BatchProgress { cursor: 1, .. })
    })
    .await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.placer.placed(), vec!["a"]);
    assert_eq!(h.store.lead("a").unwrap().unwrap().status, LeadStatus::Hot);

    h.orchestrator.resume(&job_id).unwrap();
    wait_for_type(&mut events, "batch_completed").await;
    assert_eq!(h.placer.placed(), vec!["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_external_hot_signal_preempts_and_stop_is_final() {
    let h = harness(
        vec![cold("l1"), cold("l2"), cold("l3")],
        &[("l1", Script::Hold)],
        monday(12, 0),
    );
    let mut events = h.events();
    let job_id = h.orchestrator.start(CAMPAIGN, None, None).unwrap();
    wait_for_type(&mut events, "call_started").await;

    let paused = h.orchestrator.lead_became_hot(CAMPAIGN, "l3").unwrap();
    assert_eq!(paused.as_deref(), Some(job_id.as_str()));
    let job = h.orchestrator.job(&job_id).unwrap();
    assert_eq!(job.state, BatchState::Paused);
    assert_eq!(
        job.pause_reason,
        Some(PauseReason::HotLead {
            lead_id: "l3".to_string()
        })
    );
    assert_eq!(h.store.lead("l3").unwrap().unwrap().status, LeadStatus::Hot);

    h.placer.release("l1", CallResult::missed(CallResultStatus::Busy));
    wait_for(&mut events, |e| {
        matches!(e, DialerEvent::BatchProgress { cursor: 1, .. })
    })
    .await;

    h.orchestrator.stop(&job_id, "supervisor-2").unwrap();
    wait_for_type(&mut events, "batch_stopped").await;

    let job = h.orchestrator.job(&job_id).unwrap();
    assert_eq!(job.state, BatchState::Stopped);
    assert_eq!(job.stopped_by.as_deref(), Some("supervisor-2"));
    assert!(matches!(
        h.orchestrator.resume(&job_id),
        Err(CommandError::InvalidStateTransition {
            from: BatchState::Stopped,
            to: BatchState::Running
        })
    ));

    h.orchestrator.wait(&job_id).await.unwrap();
    assert_eq!(h.placer.placed(), vec!["l1"]);
    assert_eq!(h.claim_state("l2"), ClaimState::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_leads_turned_hot_or_manual_are_never_dialed() {
    let h = harness(
        vec![cold("l1"), cold("l2"), cold("l3")],
        &[("l1", Script::Hold)],
        monday(12, 0),
    );
    let mut skips = h
        .bus
        .subscribe_filtered(EventFilter::new().types(vec!["lead_skipped"]))
        .unwrap();
    let mut events = h.events();
    let job_id = h.orchestrator.start(CAMPAIGN, None, None).unwrap();
    wait_for_type(&mut events, "call_started").await;

    // Both changes land after the snapshot was taken
    h.orchestrator.lead_became_hot(CAMPAIGN, "l3").unwrap();
    let mut manual = h.store.lead("l2").unwrap().unwrap();
    manual.auto_dial = false;
    h.store.update_lead(&manual).unwrap();

    h.placer.release("l1", CallResult::completed(40, "not today"));
    wait_for(&mut events, |e| {
        matches!(e, DialerEvent::BatchProgress { cursor: 1, .. })
    })
    .await;
    h.orchestrator.resume(&job_id).unwrap();
    wait_for_type(&mut events, "batch_completed").await;

    assert_eq!(h.placer.placed(), vec!["l1"]);
    assert_eq!(h.claim_state("l2"), ClaimState::Skipped);
    assert_eq!(h.claim_state("l3"), ClaimState::Skipped);
    assert_eq!(h.store.lead("l3").unwrap().unwrap().status, LeadStatus::Hot);
    assert!(h.store.attempts_for_lead("l3").unwrap().is_empty());

    let job = h.orchestrator.job(&job_id).unwrap();
    assert_eq!(job.cursor, 3);
    assert_eq!(job.counters.completed, 1);
    assert_eq!(job.counters.skipped, 2);
    assert_eq!(job.counters.in_progress, 0);

    let skipped: Vec<(String, LeadStatus)> = std::iter::from_fn(|| skips.try_recv())
        .filter_map(|event| match event {
            DialerEvent::LeadSkipped {
                lead_id,
                lead_status,
                ..
            } => Some((lead_id, lead_status)),
            _ => None,
        })
        .collect();
    assert_eq!(
        skipped,
        vec![
            ("l2".to_string(), LeadStatus::Cold),
            ("l3".to_string(), LeadStatus::Hot),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_hot_signal_during_window_pause_holds_batch() {
    let h = harness(vec![cold("l1"), cold("l2"), cold("l3")], &[], monday(20, 0));
    let mut events = h.events();
    let job_id = h.orchestrator.start(CAMPAIGN, None, None).unwrap();
    wait_for_type(&mut events, "batch_skipped_outside_window").await;

    let held = h.orchestrator.lead_became_hot(CAMPAIGN, "l1").unwrap();
    assert_eq!(held.as_deref(), Some(job_id.as_str()));
    let hot = PauseReason::HotLead {
        lead_id: "l1".to_string(),
    };
    let paused = wait_for(&mut events, |e| {
        matches!(e, DialerEvent::BatchPaused { reason: PauseReason::HotLead { .. }, .. })
    })
    .await;
    assert!(matches!(paused, DialerEvent::BatchPaused { ref reason, .. } if *reason == hot));

    // The window reopens, but a human now holds the batch
    h.clock
        .set(Utc.with_ymd_and_hms(2026, 3, 3, 9, 30, 0).unwrap());
    tokio::time::sleep(Duration::from_secs(600)).await;
    let job = h.orchestrator.job(&job_id).unwrap();
    assert_eq!(job.state, BatchState::Paused);
    assert_eq!(job.pause_reason, Some(hot));
    assert!(h.placer.placed().is_empty());

    h.orchestrator.resume(&job_id).unwrap();
    wait_for_type(&mut events, "batch_completed").await;
    assert_eq!(h.placer.placed(), vec!["l2", "l3"]);
    assert_eq!(h.claim_state("l1"), ClaimState::Skipped);
}

#[tokio::test(start_paused = true)]
async fn test_new_batch_leaves_stopped_batch_call_alone() {
    let h = harness(
        vec![cold("x"), cold("y")],
        &[("x", Script::Hold)],
        monday(10, 0),
    );
    let mut events = h.events();
    let first = h.orchestrator.start(CAMPAIGN, None, None).unwrap();
    wait_for_type(&mut events, "call_started").await;

    // Stop lets the call on x run on
    h.orchestrator.stop(&first, "ops").unwrap();
    let second = h.orchestrator.start(CAMPAIGN, None, None).unwrap();
    assert_eq!(
        h.orchestrator.job(&second).unwrap().ordered_lead_ids,
        vec!["y".to_string()]
    );
    assert_eq!(h.claim_state("x"), ClaimState::InProgress);

    wait_for(&mut events, |e| {
        matches!(e, DialerEvent::BatchCompleted { job_id, .. } if *job_id == second)
    })
    .await;
    assert_eq!(h.placer.placed(), vec!["x", "y"]);

    // The stopped batch's runner still owns x
    assert!(h.orchestrator.recover().unwrap().is_empty());
    assert_eq!(h.claim_state("x"), ClaimState::InProgress);

    h.placer.release("x", CallResult::completed(20, "maybe later"));
    h.orchestrator.wait(&first).await.unwrap();
    assert_eq!(h.claim_state("x"), ClaimState::Completed);
    assert_eq!(h.placer.placed(), vec!["x", "y"]);
    assert_eq!(h.store.attempts_for_lead("x").unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_placement_failures_do_not_abort_batch() {
    let h = harness(
        vec![cold("l1"), cold("l2"), cold("l3")],
        &[("l1", Script::Reject), ("l2", Script::Hold)],
        monday(10, 0),
    );
    let mut failures = h
        .bus
        .subscribe_filtered(EventFilter::new().types(vec!["call_failed"]))
        .unwrap();
    let mut events = h.events();
    let job_id = h.orchestrator.start(CAMPAIGN, None, None).unwrap();

    // l2 never reports back; the placement timeout gives up on it
    wait_for_type(&mut events, "batch_completed").await;

    let job = h.orchestrator.job(&job_id).unwrap();
    assert_eq!(job.counters.failed, 2);
    assert_eq!(job.counters.completed, 1);
    assert_eq!(h.claim_state("l1"), ClaimState::Failed);
    assert_eq!(h.claim_state("l2"), ClaimState::Failed);
    assert_eq!(h.claim_state("l3"), ClaimState::Completed);

    let first = failures.try_recv().unwrap();
    assert_eq!(first.lead_id(), Some("l1"));
    let second = failures.try_recv().unwrap();
    match second {
        DialerEvent::CallFailed { call_id, error, .. } => {
            assert_eq!(call_id.as_deref(), Some("call-l2-2"));
            assert!(error.contains("timed out"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(h.store.lead("l2").unwrap().unwrap().retry.retry_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_commands_reject_invalid_requests() {
    let h = harness(vec![cold("l1")], &[("l1", Script::Hold)], monday(10, 0));
    let mut events = h.events();

    assert!(matches!(
        h.orchestrator.pause("no-such-job"),
        Err(CommandError::NotFound { .. })
    ));

    let job_id = h.orchestrator.start(CAMPAIGN, None, None).unwrap();
    wait_for_type(&mut events, "call_started").await;

    // One active batch per campaign
    assert!(matches!(
        h.orchestrator.start(CAMPAIGN, None, None),
        Err(CommandError::InvalidStateTransition {
            to: BatchState::Queued,
            ..
        })
    ));
    // Resuming a running job is rejected and changes nothing
    assert!(h.orchestrator.resume(&job_id).is_err());
    assert_eq!(h.job_state(&job_id), BatchState::Running);

    h.placer.release("l1", CallResult::completed(12, "no thanks"));
    wait_for_type(&mut events, "batch_completed").await;

    assert!(matches!(
        h.orchestrator.pause(&job_id),
        Err(CommandError::InvalidStateTransition {
            from: BatchState::Completed,
            to: BatchState::Paused
        })
    ));
    let transitions = h.orchestrator.job(&job_id).unwrap().transitions.len();
    assert_eq!(transitions, 3);

    // A finished campaign can be started again
    assert!(h.orchestrator.start(CAMPAIGN, None, None).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_empty_snapshot_completes_immediately() {
    let hot = LeadEntry::new("h", CAMPAIGN, "+1", LeadStatus::Hot);
    let h = harness(vec![hot], &[], monday(21, 0));
    let mut events = h.events();

    let job_id = h.orchestrator.start(CAMPAIGN, None, None).unwrap();
    wait_for_type(&mut events, "batch_completed").await;

    let job = h.orchestrator.job(&job_id).unwrap();
    assert_eq!(job.total(), 0);
    assert_eq!(job.state, BatchState::Completed);
    assert!(h.placer.placed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_then_recover_redials_in_flight_lead() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let store = MemoryStore::new().shared();
    store
        .insert_leads(vec![cold("l1"), cold("l2")])
        .unwrap();

    let first = harness_with(
        Arc::clone(&store),
        ScriptedPlacer::new(&[("l1", Script::Hold)]),
        monday(10, 0),
    );
    let mut events = first.events();
    let job_id = first.orchestrator.start(CAMPAIGN, None, None).unwrap();
    wait_for_type(&mut events, "call_started").await;

    first.orchestrator.shutdown().await;
    assert_eq!(first.claim_state("l1"), ClaimState::InProgress);
    assert_eq!(first.job_state(&job_id), BatchState::Running);

    let second = harness_with(Arc::clone(&store), ScriptedPlacer::new(&[]), monday(10, 5));
    let mut events = second.events();
    assert_eq!(second.orchestrator.recover().unwrap(), vec![job_id.clone()]);

    wait_for_type(&mut events, "batch_completed").await;
    assert_eq!(second.placer.placed(), vec!["l1", "l2"]);

    let job = second.orchestrator.job(&job_id).unwrap();
    assert_eq!(job.state, BatchState::Completed);
    assert_eq!(job.counters.completed, 2);
    assert_eq!(job.counters.in_progress, 0);
}

#[tokio::test(start_paused = true)]
async fn test_recover_from_snapshot_keeps_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dialer.json");
    let now = monday(10, 0);

    // A run that crashed after finishing l1 and while calling l2
    {
        let store = MemoryStore::new();
        let mut l1 = cold("l1");
        l1.claim_state = ClaimState::Completed;
        let mut l2 = cold("l2");
        l2.claim_state = ClaimState::InProgress;
        store.insert_leads(vec![l1, l2, cold("l3")]).unwrap();

        let mut job = dialer::BatchJob::new(
            CAMPAIGN,
            vec!["l1".to_string(), "l2".to_string(), "l3".to_string()],
            24,
            3,
            now,
        );
        job.advance(BatchState::Queued, None, now).unwrap();
        job.advance(BatchState::Running, None, now).unwrap();
        job.cursor = 1;
        job.counters.pending = 1;
        job.counters.in_progress = 1;
        job.counters.completed = 1;
        store.save_job(&job).unwrap();
        store.save_snapshot(&path).unwrap();
    }

    let store = MemoryStore::load_snapshot(&path).unwrap().unwrap().shared();
    let h = harness_with(store, ScriptedPlacer::new(&[]), now);
    let mut events = h.events();

    let recovered = h.orchestrator.recover().unwrap();
    assert_eq!(recovered.len(), 1);
    let progress = h.orchestrator.progress(&recovered[0]).unwrap();
    assert_eq!(progress.counters.pending, 2);
    assert_eq!(progress.counters.in_progress, 0);

    wait_for_type(&mut events, "batch_completed").await;
    assert_eq!(h.placer.placed(), vec!["l2", "l3"]);
    assert_eq!(h.store.attempts_for_lead("l1").unwrap().len(), 0);
    assert_eq!(
        h.orchestrator.progress(&recovered[0]).unwrap().counters.completed,
        3
    );
}
