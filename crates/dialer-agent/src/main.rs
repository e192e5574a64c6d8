//! Dialer agent binary
//!
//! Dials one campaign's eligible leads through the simulated call service.
//!
//! # Usage
//!
//! ```bash
//! # Ten generated leads, defaults everywhere
//! dialer-agent --always-open
//!
//! # Config file, restartable state and a run summary
//! dialer-agent --config agent.toml --snapshot state.json --summary run.json
//!
//! # Fast demo pacing
//! DIALER_PACING_DELAY_MS=100 RUST_LOG=dialer=debug dialer-agent --always-open
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dialer::SystemClock;
use dialer_agent::AgentConfig;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the agent TOML config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Campaign to dial (overrides campaign_id)
    #[arg(long)]
    campaign: Option<String>,

    /// JSON array of leads for an empty store (overrides leads_path)
    #[arg(long)]
    leads: Option<PathBuf>,

    /// Number of generated leads when no lead file is given
    #[arg(long)]
    demo_leads: Option<usize>,

    /// Store snapshot to load at startup and write on exit
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Where to write the JSON run summary
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Shut down after this many seconds
    #[arg(long)]
    max_runtime_secs: Option<u64>,

    /// Pause between calls in milliseconds (overrides dialer.pacing_delay_ms)
    #[arg(long)]
    pacing_ms: Option<u64>,

    /// Permit calls at any hour on any day
    #[arg(long, default_value_t = false)]
    always_open: bool,

    /// Leave the batch paused when a lead turns hot
    #[arg(long, default_value_t = false)]
    hold_on_hot: bool,
}

impl Args {
    fn apply(self, config: &mut AgentConfig) {
        if let Some(campaign) = self.campaign {
            config.campaign_id = campaign;
        }
        if let Some(path) = self.leads {
            config.leads_path = Some(path);
        }
        if let Some(n) = self.demo_leads {
            config.demo_leads = n;
        }
        if let Some(path) = self.snapshot {
            config.snapshot_path = Some(path);
        }
        if let Some(path) = self.summary {
            config.summary_path = Some(path);
        }
        if let Some(secs) = self.max_runtime_secs {
            config.max_runtime_secs = secs;
        }
        if let Some(ms) = self.pacing_ms {
            config.dialer.pacing_delay_ms = ms;
        }
        if self.always_open {
            config.open_all_hours();
        }
        if self.hold_on_hot {
            config.resume_after_hot = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = AgentConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    info!(
        campaign_id = %config.campaign_id,
        window = %format!("{}-{}", config.dialer.window.start, config.dialer.window.end),
        pacing_ms = config.dialer.pacing_delay_ms,
        "Dialer agent starting"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => on_signal.cancel(),
            Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
        }
    });

    let summary = dialer_agent::run(config, Arc::new(SystemClock), cancel).await?;
    info!(
        job_id = summary.job_id.as_deref().unwrap_or("-"),
        state = ?summary.final_state,
        completed = summary.counters.completed,
        failed = summary.counters.failed,
        high_risk_calls = summary.high_risk_calls.len(),
        "Run finished"
    );
    Ok(())
}
