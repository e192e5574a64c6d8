//! Event bus for dialer notifications
//!
//! Tokio broadcast channel with a bounded per-subscriber queue. Publishing never
//! blocks and never fails: with no subscribers the event is simply dropped, and
//! a subscriber that falls behind loses its oldest events.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::DialerEvent;
use crate::config::DialerConfig;

/// Default channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Default subscriber cap
const MAX_SUBSCRIBERS: usize = 64;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Subscriber limit reached ({0})")]
    TooManySubscribers(usize),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus over a bounded broadcast channel
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<DialerEvent>,
    max_subscribers: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_limits(CHANNEL_CAPACITY, MAX_SUBSCRIBERS)
    }

    /// Create a bus with an explicit queue bound and subscriber cap
    pub fn with_limits(capacity: usize, max_subscribers: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            max_subscribers,
        }
    }

    pub fn from_config(config: &DialerConfig) -> Self {
        Self::with_limits(config.event_capacity, config.max_subscribers)
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers. Returns how many received it.
    pub fn publish(&self, event: DialerEvent) -> usize {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
                count
            }
            Err(_) => {
                debug!(event_type, "Event published (no receivers)");
                0
            }
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> EventBusResult<broadcast::Receiver<DialerEvent>> {
        if self.sender.receiver_count() >= self.max_subscribers {
            return Err(EventBusError::TooManySubscribers(self.max_subscribers));
        }
        Ok(self.sender.subscribe())
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventBusResult<FilteredReceiver> {
        Ok(FilteredReceiver::new(self.subscribe()?, filter))
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub job_id: Option<String>,
    pub call_id: Option<String>,
    pub lead_id: Option<String>,
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(mut self, job_id: &str) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }

    pub fn call(mut self, call_id: &str) -> Self {
        self.call_id = Some(call_id.to_string());
        self
    }

    pub fn lead(mut self, lead_id: &str) -> Self {
        self.lead_id = Some(lead_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter.
    ///
    /// An id filter rejects events that carry no such id.
    pub fn matches(&self, event: &DialerEvent) -> bool {
        if let Some(ref job_id) = self.job_id {
            if event.job_id() != Some(job_id.as_str()) {
                return false;
            }
        }
        if let Some(ref call_id) = self.call_id {
            if event.call_id() != Some(call_id.as_str()) {
                return false;
            }
        }
        if let Some(ref lead_id) = self.lead_id {
            if event.lead_id() != Some(lead_id.as_str()) {
                return false;
            }
        }
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }
        true
    }
}

/// Filtered event receiver that only yields matching events and steps over lag gaps
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<DialerEvent>,
    filter: EventFilter,
    missed: u64,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<DialerEvent>, filter: EventFilter) -> Self {
        Self {
            receiver,
            filter,
            missed: 0,
        }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> EventBusResult<DialerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => self.note_lag(n),
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed)
                }
            }
        }
    }

    /// Next matching event already queued, if any
    pub fn try_recv(&mut self) -> Option<DialerEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.note_lag(n),
                Err(_) => return None,
            }
        }
    }

    /// Total events lost to lag so far
    pub fn missed(&self) -> u64 {
        self.missed
    }

    fn note_lag(&mut self, n: u64) {
        self.missed += n;
        warn!(skipped = n, "Event subscriber lagged; oldest events dropped");
    }
}
