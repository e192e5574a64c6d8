//! Live Call Monitor
//!
//! Tracks transcript chunks for each active call, rescoring the whole
//! transcript on every chunk and signalling medium/high risk on the bus.

pub mod live;
pub mod risk;

pub use live::{LiveCallMonitor, LiveCallState, MonitorError, SharedLiveMonitor};
pub use risk::{assess_risk, RecommendedAction, RiskAssessment, RiskLevel, Suggestion};
