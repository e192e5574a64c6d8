//! Notification bus
//!
//! In-process, typed pub/sub for batch, call and live-monitor events. There is
//! no persistence and no replay: a subscriber sees what is published while it
//! is subscribed, in publish order, minus anything it lagged past.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ BatchRunner  │────▶│  Event Bus   │────▶│  Subscribers │
//! │ LiveMonitor  │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{
    EventBus, EventBusError, EventBusResult, EventFilter, FilteredReceiver, SharedEventBus,
};
pub use types::DialerEvent;
