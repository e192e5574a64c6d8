//! Dialer agent
//!
//! Runs the `dialer` core as a process: configuration from TOML, environment
//! and CLI, a simulated call service and transcript scorer, and an event
//! telemetry sink that writes a JSON run summary.

pub mod app;
pub mod config;
pub mod leads;
pub mod sim;
pub mod telemetry;

pub use app::run;
pub use config::AgentConfig;
pub use sim::{KeywordScorer, SimOutcome, SimulatedPlacer, SimulationConfig};
pub use telemetry::{RunSummary, TelemetrySink};
