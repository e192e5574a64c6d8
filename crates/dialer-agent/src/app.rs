//! One agent run: wire the core to the simulated collaborators, start (or
//! recover) the campaign's batch and follow it on the bus until it ends.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dialer::{
    CampaignOrchestrator, Collaborators, DialerEvent, EventBus, EventFilter, LiveCallMonitor,
    MemoryStore, PauseReason, SharedClock, SharedScorer,
};

use crate::config::AgentConfig;
use crate::leads::{demo_leads, load_leads};
use crate::sim::{KeywordScorer, SimulatedPlacer};
use crate::telemetry::{RunSummary, TelemetrySink};

/// Run the configured campaign until its batch completes or stops, the run
/// time limit passes, or `cancel` fires. In-flight work left by the last two
/// is picked up by `recover` on the next run from the same snapshot.
pub async fn run(
    config: AgentConfig,
    clock: SharedClock,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    config.validate()?;

    let store = open_store(&config, clock.now())?;
    let bus = EventBus::from_config(&config.dialer).shared();
    let scorer: SharedScorer =
        Arc::new(KeywordScorer::new().context("Failed to compile scorer patterns")?);
    let monitor =
        LiveCallMonitor::new(Arc::clone(&scorer), Arc::clone(&bus), Arc::clone(&clock)).shared();
    let placer = Arc::new(SimulatedPlacer::new(
        config.simulation.clone(),
        Arc::clone(&monitor),
    ));

    let orchestrator = CampaignOrchestrator::new(
        config.dialer.clone(),
        Collaborators {
            store: store.clone(),
            placer,
            scorer,
            bus: Arc::clone(&bus),
            monitor,
            clock: Arc::clone(&clock),
        },
    )
    .context("Invalid dialer configuration")?;

    let mut events = bus
        .subscribe_filtered(EventFilter::new())
        .context("Failed to subscribe to dialer events")?;
    let mut sink = TelemetrySink::new(&config.campaign_id, clock.now());

    let recovered = orchestrator.recover().context("Failed to recover batches")?;
    let resumed = recovered
        .iter()
        .find(|id| {
            orchestrator
                .job(id)
                .map(|job| job.campaign_id == config.campaign_id)
                .unwrap_or(false)
        })
        .cloned();
    let job_id = match resumed {
        Some(job_id) => {
            info!(%job_id, "Continuing recovered batch");
            job_id
        }
        None => orchestrator
            .start(&config.campaign_id, None, None)
            .context("Failed to start batch")?,
    };

    let deadline = tokio::time::sleep(Duration::from_secs(config.max_runtime_secs));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(%job_id, "Interrupted; shutting down");
                break;
            }
            _ = &mut deadline => {
                warn!(%job_id, max_runtime_secs = config.max_runtime_secs, "Run time limit reached; shutting down");
                break;
            }
            event = events.recv() => {
                let event = event.context("Dialer event bus closed")?;
                sink.record(&event);
                if event.job_id() != Some(job_id.as_str()) {
                    continue;
                }
                match event {
                    DialerEvent::BatchPaused {
                        reason: PauseReason::HotLead { lead_id },
                        ..
                    } if config.resume_after_hot => {
                        info!(%job_id, %lead_id, "Hot lead handed to a supervisor; resuming");
                        if let Err(e) = orchestrator.resume(&job_id) {
                            warn!(%job_id, error = %e, "Could not resume after hot lead");
                        }
                    }
                    DialerEvent::BatchCompleted { .. } | DialerEvent::BatchStopped { .. } => break,
                    _ => {}
                }
            }
        }
    }

    orchestrator.shutdown().await;
    while let Some(event) = events.try_recv() {
        sink.record(&event);
    }

    if let Some(path) = &config.snapshot_path {
        store
            .save_snapshot(path)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        info!(path = %path.display(), "Saved store snapshot");
    }

    let job = orchestrator.job(&job_id).ok();
    let summary = sink.finish(job.as_ref(), events.missed(), clock.now());
    if let Some(path) = &config.summary_path {
        summary.write(path)?;
    }
    Ok(summary)
}

/// Load the snapshot if there is one; seed an empty store with leads
fn open_store(config: &AgentConfig, now: DateTime<Utc>) -> Result<Arc<MemoryStore>> {
    let restored = match &config.snapshot_path {
        Some(path) => MemoryStore::load_snapshot(path)
            .with_context(|| format!("Failed to load snapshot {}", path.display()))?,
        None => None,
    };
    let store = restored.unwrap_or_default();

    if store.lead_count()? == 0 {
        let leads = match &config.leads_path {
            Some(path) => load_leads(path)?,
            None => demo_leads(&config.campaign_id, config.demo_leads, now),
        };
        info!(count = leads.len(), campaign_id = %config.campaign_id, "Seeding leads");
        store.insert_leads(leads)?;
    }
    Ok(store.shared())
}
