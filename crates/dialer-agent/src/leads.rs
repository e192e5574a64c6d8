//! Lead sources: a JSON file, or a generated demo pool.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

use dialer::{LeadEntry, LeadStatus};

/// Read a JSON array of leads
pub fn load_leads(path: &Path) -> Result<Vec<LeadEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read leads file {}", path.display()))?;
    let leads: Vec<LeadEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse leads file {}", path.display()))?;
    Ok(leads)
}

/// Generate `count` leads for a campaign.
///
/// Every fourth lead is Warm and every fifth a not-picked lead on its first
/// retry, last called two days before `now`; the rest are fresh Cold leads.
pub fn demo_leads(campaign_id: &str, count: usize, now: DateTime<Utc>) -> Vec<LeadEntry> {
    (1..=count)
        .map(|i| {
            let id = format!("lead-{i:03}");
            let phone = format!("+1555000{i:04}");
            if i % 5 == 0 {
                LeadEntry::new(id, campaign_id, phone, LeadStatus::NotPick)
                    .with_retry_count(1)
                    .with_last_call_at(now - Duration::days(2))
            } else if i % 4 == 0 {
                LeadEntry::new(id, campaign_id, phone, LeadStatus::Warm)
            } else {
                LeadEntry::new(id, campaign_id, phone, LeadStatus::Cold)
            }
        })
        .collect()
}
