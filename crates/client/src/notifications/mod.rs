//! User-facing notification pipeline.
//!
//! ```text
//!  ConnectionManager ─┐
//!  HTTP callers ──────┼─▶ NotificationBus ──▶ DeliveryQueue ──┐
//!  anything else ─────┘      (fan-out)        (one at a time) ├─▶ StatusBoard ─▶ view
//!                          ReachabilityMonitor (offline flag) ┘
//! ```

mod bus;
mod event;
mod queue;
mod status;

pub use bus::{BusSubscription, NotificationBus};
pub use event::{Notice, NotificationEvent};
pub use queue::{DeliveryQueue, NotificationQueueState, DEFAULT_DISPLAY_FOR};
pub use status::{StatusBoard, StatusSnapshot};
