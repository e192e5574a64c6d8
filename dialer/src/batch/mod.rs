//! Batch State Machine
//!
//! - [`state`]: job states, the legal transition graph and the job record
//! - [`scheduler`]: the per-job dialing loop
//! - [`orchestrator`]: the job registry and operator commands

pub mod orchestrator;
pub(crate) mod scheduler;
pub mod state;

pub use orchestrator::{CampaignOrchestrator, Collaborators};
pub use state::{
    is_legal_transition, BatchCounters, BatchJob, BatchProgress, BatchState, IllegalTransition,
    PauseReason, TransitionRecord,
};
