//! Connection state, session context and the transport boundary.
//!
//! The manager depends only on [`Transport`]; the native implementation
//! lives in `connection_native`.

use std::fmt;

use async_trait::async_trait;
use chatline_shared::TransportError;
use futures_channel::mpsc::UnboundedSender;
use futures_util::stream::BoxStream;
use serde::Serialize;

/// Connection state for the realtime session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity material for the transport handshake. Opaque to the manager.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub url: String,
    pub token: Option<String>,
    /// Requested websocket subprotocols
    pub protocols: Vec<String>,
}

impl SessionContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            protocols: Vec::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("protocols", &self.protocols)
            .finish()
    }
}

/// Something that happened on an open transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame
    Message(String),
    /// A transport-level error; a `Closed` event follows when the channel dies
    Error(String),
    Closed { code: Option<u16>, reason: String },
}

/// An open bidirectional channel.
///
/// Dropping `outbound` closes the channel. `inbound` yields events in arrival
/// order and ends after the channel is gone.
pub struct TransportLink {
    pub outbound: UnboundedSender<String>,
    pub inbound: BoxStream<'static, TransportEvent>,
}

/// Opens realtime channels. `open` resolving successfully is the handshake.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, session: &SessionContext) -> Result<TransportLink, TransportError>;
}

mod connection_native;
pub use connection_native::TungsteniteTransport;
