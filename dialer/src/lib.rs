//! Outbound campaign dialer core
//!
//! Decides when and in what order to call a campaign's leads, keeps one call
//! in flight per batch, and watches live transcripts for risk.
//!
//! # Modules
//!
//! - [`policy`]: call-window and retry/cooldown policies (pure)
//! - [`queue`]: eligible-lead selection and ordering
//! - [`batch`]: batch state machine, dialing loop and orchestrator
//! - [`monitor`]: live call state and risk rules
//! - [`events`]: typed notification bus
//! - [`store`]: persistence contract and the in-memory store
//! - [`collab`]: calling service and transcript scorer seams

pub mod batch;
pub mod clock;
pub mod collab;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod monitor;
pub mod policy;
pub mod queue;
pub mod store;

pub use batch::{
    BatchCounters, BatchJob, BatchProgress, BatchState, CampaignOrchestrator, Collaborators,
    PauseReason,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use collab::{
    CallHandle, CallPlacer, CallResult, Emotion, Objection, PlacementError, ScoreReport,
    SharedCallPlacer, SharedScorer, TranscriptScorer, Urgency,
};
pub use config::{CallWindowConfig, ConfigError, DialerConfig, RetryConfig};
pub use error::{CommandError, CommandResult};
pub use events::{
    DialerEvent, EventBus, EventBusError, EventFilter, FilteredReceiver, SharedEventBus,
};
pub use model::{CallAttempt, CallResultStatus, ClaimState, FollowUpChannel, LeadEntry, LeadStatus};
pub use monitor::{LiveCallMonitor, LiveCallState, RiskLevel, SharedLiveMonitor};
pub use policy::{CallWindow, RetryAction, RetryDecision, RetryPolicy};
pub use queue::{select_eligible_leads, SelectionCriteria};
pub use store::{DialerStore, MemoryStore, SharedStore, StoreError};
