//! Realtime WebSocket session.
//!
//! This module provides:
//! - Connection management with an explicit state machine (no hidden retries)
//! - Ordered fan-out of decoded envelopes to registered observers
//! - A transport boundary with a native tokio-tungstenite implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 ConnectionManager                   │
//! │   (state machine, outbound send, inbound decode)    │
//! └─────────────────────────────────────────────────────┘
//!            │                              │
//!            ▼                              ▼
//!   ┌──────────────────┐          ┌──────────────────────┐
//!   │    Transport     │          │ SubscriptionRegistry │
//!   │ (tungstenite or  │          │  (ordered observers) │
//!   │  test double)    │          └──────────────────────┘
//!   └──────────────────┘                    │
//!                              ┌────────────┼────────────┐
//!                              ▼            ▼            ▼
//!                         ┌────────┐   ┌────────┐   ┌────────┐
//!                         │Observer│   │Observer│   │Observer│
//!                         └────────┘   └────────┘   └────────┘
//! ```
//!
//! Failures never escape as errors from the inbound path: they are published
//! to the [`NotificationBus`](crate::notifications::NotificationBus).
//!
//! # Usage
//!
//! ```rust,ignore
//! let bus = NotificationBus::new();
//! let manager = ConnectionManager::new(TungsteniteTransport::new(), bus.clone());
//!
//! manager.subscribe(observer(|env| {
//!     if let Some(chat) = env.as_chat() {
//!         println!("{}", chat.text);
//!     }
//!     Ok(())
//! }));
//!
//! manager.connect(&SessionContext::new("wss://chat.example.com/api/ws")).await?;
//! manager.send_chat("hello", None);
//! ```

mod connection;
mod manager;
mod reconnect;
mod registry;

// Re-export connection types
pub use connection::{
    ConnectionState, SessionContext, Transport, TransportEvent, TransportLink, TungsteniteTransport,
};

pub use manager::{ConnectionManager, DEFAULT_HANDSHAKE_TIMEOUT};
pub use reconnect::{connect_with_retry, ReconnectPolicy};
pub use registry::{observer, Observer, ObserverRef, SubscriptionRegistry};
