//! Dialing policies consulted by the scheduler
//!
//! - `window`: permitted calling hours
//! - `retry`: no-pickup retry ladder and the cooldown gate

pub mod retry;
pub mod window;

pub use retry::{in_cooldown, RetryAction, RetryDecision, RetryPolicy};
pub use window::CallWindow;
