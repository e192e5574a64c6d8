//! Agent configuration
//!
//! One TOML file: top-level run settings, a `[dialer]` table for the core and
//! a `[simulation]` table for the demo call service. Environment variables
//! overlay the file and CLI flags overlay both.
//!
//! ```toml
//! campaign_id = "spring-promo"
//! demo_leads = 12
//! snapshot_path = "dialer-state.json"
//!
//! [dialer]
//! pacing_delay_ms = 500
//!
//! [dialer.window]
//! utc_offset_minutes = 60
//! start = "09:00"
//! end = "18:00"
//!
//! [simulation]
//! outcomes = ["answer", "no_answer", "answer", "busy"]
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Weekday;
use serde::{Deserialize, Serialize};

use dialer::DialerConfig;

use crate::sim::SimulationConfig;

/// Top-level agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Campaign whose leads are dialed
    pub campaign_id: String,
    /// JSON array of leads, loaded into an empty store
    pub leads_path: Option<PathBuf>,
    /// Number of generated leads when no lead file is given
    pub demo_leads: usize,
    /// Store snapshot, loaded at startup if present and written on exit
    pub snapshot_path: Option<PathBuf>,
    /// Where to write the JSON run summary
    pub summary_path: Option<PathBuf>,
    /// Shut down after this long even if the batch is not finished
    pub max_runtime_secs: u64,
    /// Resume after a hot-lead pause, as if a supervisor had taken the lead.
    /// With this off, a hot lead holds the batch until the run time limit.
    pub resume_after_hot: bool,
    pub dialer: DialerConfig,
    pub simulation: SimulationConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            campaign_id: "demo".to_string(),
            leads_path: None,
            demo_leads: 10,
            snapshot_path: None,
            summary_path: None,
            max_runtime_secs: 300,
            resume_after_hot: true,
            dialer: DialerConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load from an optional TOML file, then overlay the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse agent config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid agent config TOML")
    }

    /// Overlay `DIALER_AGENT_*` variables, and `DIALER_*` onto the core config
    pub fn apply_env(&mut self) {
        self.dialer.apply_env();
        if let Ok(val) = std::env::var("DIALER_AGENT_CAMPAIGN") {
            self.campaign_id = val;
        }
        if let Ok(val) = std::env::var("DIALER_AGENT_LEADS") {
            self.leads_path = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("DIALER_AGENT_SNAPSHOT") {
            self.snapshot_path = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("DIALER_AGENT_SUMMARY") {
            self.summary_path = Some(PathBuf::from(val));
        }
        if let Some(n) = std::env::var("DIALER_AGENT_MAX_RUNTIME_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.max_runtime_secs = n;
        }
    }

    /// Permit calls from 00:00 to 23:59 on every day
    pub fn open_all_hours(&mut self) {
        self.dialer.window.start = "00:00".to_string();
        self.dialer.window.end = "23:59".to_string();
        self.dialer.window.weekdays = vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
    }

    pub fn validate(&self) -> Result<()> {
        if self.campaign_id.trim().is_empty() {
            bail!("campaign_id must not be empty");
        }
        if self.simulation.outcomes.is_empty() {
            bail!("simulation.outcomes must list at least one outcome");
        }
        self.dialer
            .validate()
            .context("Invalid [dialer] configuration")?;
        Ok(())
    }
}
