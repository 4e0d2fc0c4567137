//! Chatline Client - realtime session subsystem
//!
//! One persistent WebSocket connection with an explicit state machine,
//! ordered fan-out of inbound messages, and a notification pipeline that
//! shows user-facing failures one at a time next to an offline banner.

pub mod logging;

pub mod config;
pub mod notifications;
pub mod reachability;
pub mod ws;

pub use chatline_shared as shared;

pub use config::ClientConfig;
pub use notifications::{DeliveryQueue, Notice, NotificationBus, NotificationEvent, StatusBoard};
pub use reachability::{ReachabilityMonitor, ReachabilitySensor};
pub use ws::{ConnectionManager, ConnectionState, SessionContext};
