//! Risk rules for live calls
//!
//! Deterministic: the same emotion, urgency and objection set always yield the
//! same level. Rules are checked highest level first and the first match wins.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::collab::{Emotion, Objection, Urgency};

/// How likely the call is to go wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Advisory action attached to a risk signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    /// A human agent should take over the call
    HumanHandoff,
}

/// Risk level plus the rule that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub reason: Option<String>,
}

impl RiskAssessment {
    pub fn recommended_action(&self) -> Option<RecommendedAction> {
        (self.level == RiskLevel::High).then_some(RecommendedAction::HumanHandoff)
    }
}

/// Evaluate the risk rules
pub fn assess_risk(
    emotion: Emotion,
    urgency: Urgency,
    objections: &BTreeSet<Objection>,
) -> RiskAssessment {
    let frustrated = emotion == Emotion::Frustrated;
    let high_urgency = urgency == Urgency::High;
    let distinct = objections.len();

    let high = if frustrated && high_urgency {
        Some("frustrated caller with high urgency".to_string())
    } else if distinct >= 3 {
        Some(format!("{} distinct objections", distinct))
    } else if frustrated
        && (objections.contains(&Objection::Trust) || objections.contains(&Objection::Price))
    {
        Some("frustrated caller raising trust or price".to_string())
    } else {
        None
    };
    if let Some(reason) = high {
        return RiskAssessment {
            level: RiskLevel::High,
            reason: Some(reason),
        };
    }

    let medium = if frustrated {
        Some("frustrated caller".to_string())
    } else if high_urgency {
        Some("high urgency".to_string())
    } else if distinct >= 2 {
        Some(format!("{} distinct objections", distinct))
    } else {
        None
    };
    match medium {
        Some(reason) => RiskAssessment {
            level: RiskLevel::Medium,
            reason: Some(reason),
        },
        None => RiskAssessment {
            level: RiskLevel::Low,
            reason: None,
        },
    }
}

/// A coaching hint for the live agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Stable key; each key is surfaced at most once per call
    pub key: String,
    pub text: String,
}

/// Hints derived from the current emotion and objections
pub fn suggestions_for(emotion: Emotion, objections: &BTreeSet<Objection>) -> Vec<Suggestion> {
    let mut out: Vec<Suggestion> = objections
        .iter()
        .map(|objection| {
            let text = match objection {
                Objection::Price => "Reframe on value and mention flexible payment options",
                Objection::Trust => "Offer references and explain how data is protected",
                Objection::Timing => "Offer a callback at a time that suits the caller",
                Objection::Need => "Ask what problem they are trying to solve today",
                Objection::Competitor => "Acknowledge the alternative and highlight differences",
            };
            Suggestion {
                key: format!("objection:{}", objection),
                text: text.to_string(),
            }
        })
        .collect();

    match emotion {
        Emotion::Frustrated => out.push(Suggestion {
            key: "emotion:frustrated".to_string(),
            text: "Slow down, acknowledge the frustration and summarize their concern"
                .to_string(),
        }),
        Emotion::Hesitant => out.push(Suggestion {
            key: "emotion:hesitant".to_string(),
            text: "Ask an open question to surface what is holding them back".to_string(),
        }),
        Emotion::Neutral | Emotion::Positive => {}
    }
    out
}
