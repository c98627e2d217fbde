//! Notification events for the review workflow
//!
//! The core publishes state changes (ballot accepted, threshold crossed,
//! item revealed, outcome recorded) on a broadcast bus so the hosting
//! panel can update without polling. Delivery is at-least-once from the
//! subscriber's point of view: racing writers may publish a threshold
//! crossing twice.

pub mod bus;
pub mod types;

pub use bus::{EventBus, SharedEventBus};
pub use types::ReviewEvent;
