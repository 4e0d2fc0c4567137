//! Realtime connection manager.
//!
//! Owns the transport link and the connection state machine:
//!
//! ```text
//! Disconnected --connect()--> Connecting --handshake ok--> Connected
//!      ^                          |                            |
//!      +----handshake failure-----+                            |
//!      +----------transport error / close----------------------+
//!      +----disconnect() from Connecting or Connected
//! ```
//!
//! Every `connect()` attempt gets a new epoch. A handshake or an inbound event
//! that belongs to an older epoch is discarded, so a `disconnect()` issued
//! while a handshake is in flight cannot be undone by the late success.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chatline_shared::{
    decode_envelope, encode_frame, ClientCommand, ConnectionError, SendRejected, WsEnvelope,
};
use futures_channel::mpsc::UnboundedSender;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::connection::{
    ConnectionState, SessionContext, Transport, TransportEvent, TransportLink,
};
use super::registry::{ObserverRef, SubscriptionRegistry};
use crate::notifications::{Notice, NotificationBus};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Owns the single realtime connection. Cloning yields another handle to the
/// same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Box<dyn Transport>,
    registry: SubscriptionRegistry,
    bus: NotificationBus,
    handshake_timeout: Duration,
    /// Written only while `link` is locked
    state: watch::Sender<ConnectionState>,
    link: Mutex<LinkSlot>,
}

#[derive(Default)]
struct LinkSlot {
    epoch: u64,
    endpoint: Option<String>,
    outbound: Option<UnboundedSender<String>>,
    pump: Option<JoinHandle<()>>,
    last_error: Option<ConnectionError>,
}

impl ConnectionManager {
    pub fn new(transport: impl Transport, bus: NotificationBus) -> Self {
        Self::with_handshake_timeout(transport, bus, DEFAULT_HANDSHAKE_TIMEOUT)
    }

    pub fn with_handshake_timeout(
        transport: impl Transport,
        bus: NotificationBus,
        handshake_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                transport: Box::new(transport),
                registry: SubscriptionRegistry::new(),
                bus,
                handshake_timeout,
                state,
                link: Mutex::new(LinkSlot::default()),
            }),
        }
    }

    /// Current state. Pure read.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.current_state()
    }

    /// Push-style view of the state, for views that prefer not to poll
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    pub fn subscribe(&self, observer: ObserverRef) -> bool {
        self.inner.registry.subscribe(observer)
    }

    pub fn unsubscribe(&self, observer: &ObserverRef) -> bool {
        self.inner.registry.unsubscribe(observer)
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.inner.bus
    }

    /// Open the connection.
    ///
    /// Does nothing if already connected. If a handshake is already in flight
    /// no second transport is opened; the call waits for that handshake and
    /// reports its outcome.
    pub async fn connect(&self, session: &SessionContext) -> Result<(), ConnectionError> {
        let epoch = {
            let mut slot = self.inner.slot();
            match self.inner.current_state() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => None,
                ConnectionState::Disconnected => {
                    slot.epoch += 1;
                    slot.endpoint = Some(session.url.clone());
                    slot.last_error = None;
                    self.inner.set_state(ConnectionState::Connecting);
                    Some(slot.epoch)
                }
            }
        };

        let Some(epoch) = epoch else {
            crate::log_debug!("connect() while a handshake is in flight; waiting for it");
            return self.await_handshake().await;
        };

        crate::log_info!("Connecting to {}", session.url);
        let opened = match tokio::time::timeout(
            self.inner.handshake_timeout,
            self.inner.transport.open(session),
        )
        .await
        {
            Ok(Ok(link)) => Ok(link),
            Ok(Err(e)) => Err(ConnectionError::from(e)),
            Err(_) => Err(ConnectionError::Timeout(self.inner.handshake_timeout)),
        };

        match opened {
            Ok(link) => self.inner.establish(epoch, link),
            Err(e) => self.inner.fail_handshake(epoch, &session.url, e),
        }
    }

    async fn await_handshake(&self) -> Result<(), ConnectionError> {
        let mut changes = self.inner.state.subscribe();
        let settled = changes
            .wait_for(|state| !state.is_connecting())
            .await
            .map(|state| *state);

        match settled {
            Ok(ConnectionState::Connected) => Ok(()),
            Ok(_) => Err(self
                .inner
                .slot()
                .last_error
                .clone()
                .unwrap_or(ConnectionError::Aborted)),
            Err(_) => Err(ConnectionError::Aborted),
        }
    }

    /// Close the transport, if any, and go to `Disconnected`.
    pub fn disconnect(&self) {
        let (previous, outbound, pump) = {
            let mut slot = self.inner.slot();
            let previous = self.inner.current_state();
            if previous == ConnectionState::Disconnected {
                return;
            }
            slot.epoch += 1;
            self.inner.set_state(ConnectionState::Disconnected);
            (previous, slot.outbound.take(), slot.pump.take())
        };

        if let Some(pump) = pump {
            pump.abort();
        }
        drop(outbound);
        crate::log_info!("Disconnected (was {})", previous);
    }

    /// Write a command to the server. Never queued: if the session is not
    /// connected the command is dropped and a notice is published instead.
    pub fn send(&self, command: ClientCommand) {
        let what = command.describe();
        let (result, endpoint) = {
            let slot = self.inner.slot();
            let state = self.inner.current_state();
            let result = match (state, slot.outbound.as_ref()) {
                (ConnectionState::Connected, Some(outbound)) => {
                    let frame = WsEnvelope::new(command);
                    match encode_frame(&frame) {
                        Ok(json) => outbound
                            .unbounded_send(json)
                            .map_err(|_| "connection is closing".to_string()),
                        Err(e) => Err(format!("could not encode frame: {}", e)),
                    }
                }
                (state, _) => Err(format!("not connected ({})", state)),
            };
            (result, slot.endpoint.clone())
        };

        if let Err(reason) = result {
            let rejected = SendRejected { what, reason };
            crate::log_warn!("{}", rejected);
            let mut notice = Notice::from(rejected);
            if let Some(endpoint) = endpoint {
                notice = notice.with_endpoint(endpoint);
            }
            self.inner.bus.publish(notice);
        }
    }

    /// Convenience wrapper for [`ClientCommand::Chat`]
    pub fn send_chat(&self, text: &str, reply_to: Option<&str>) {
        self.send(ClientCommand::chat(text, reply_to));
    }
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, LinkSlot> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            crate::log_debug!("Connection state {} -> {}", previous, next);
        }
    }

    fn establish(self: &Arc<Self>, epoch: u64, link: TransportLink) -> Result<(), ConnectionError> {
        let TransportLink { outbound, inbound } = link;
        let mut slot = self.slot();
        if slot.epoch != epoch || !self.current_state().is_connecting() {
            drop(slot);
            crate::log_info!("Handshake completed after disconnect; closing the late connection");
            drop(outbound);
            return Err(ConnectionError::Aborted);
        }

        slot.outbound = Some(outbound);
        slot.pump = Some(tokio::spawn(pump_inbound(
            Arc::downgrade(self),
            epoch,
            inbound,
        )));
        self.set_state(ConnectionState::Connected);
        crate::log_info!(
            "Connected to {}",
            slot.endpoint.as_deref().unwrap_or("<unknown>")
        );
        Ok(())
    }

    fn fail_handshake(
        &self,
        epoch: u64,
        endpoint: &str,
        err: ConnectionError,
    ) -> Result<(), ConnectionError> {
        {
            let mut slot = self.slot();
            if slot.epoch != epoch || !self.current_state().is_connecting() {
                // disconnect() already settled this attempt
                return Err(ConnectionError::Aborted);
            }
            slot.last_error = Some(err.clone());
            self.set_state(ConnectionState::Disconnected);
        }

        crate::log_error!("Connection to {} failed: {}", endpoint, err);
        self.bus
            .publish(Notice::new(format!("Could not connect: {}", err)).with_endpoint(endpoint));
        Err(err)
    }

    fn is_live(&self, epoch: u64) -> bool {
        let slot = self.slot();
        slot.epoch == epoch && self.current_state().is_connected()
    }

    fn handle_frame(&self, text: &str) {
        match decode_envelope(text) {
            Ok(envelope) => self.registry.dispatch(&envelope),
            Err(e) => {
                crate::log_warn!("Dropping inbound frame {:?}: {}", e.preview, e);
                let mut notice = Notice::new(format!("Received an unreadable message: {}", e.reason));
                if let Some(endpoint) = self.slot().endpoint.clone() {
                    notice = notice.with_endpoint(endpoint);
                }
                self.bus.publish(notice);
            }
        }
    }

    fn handle_close(&self, epoch: u64, code: Option<u16>, reason: String) {
        let endpoint = {
            let mut slot = self.slot();
            if slot.epoch != epoch || !self.current_state().is_connected() {
                return;
            }
            slot.outbound = None;
            // This is the running pump; dropping the handle just detaches it.
            slot.pump = None;
            self.set_state(ConnectionState::Disconnected);
            slot.endpoint.clone()
        };

        let reason = match code {
            Some(code) => format!("{} (code {})", reason, code),
            None => reason,
        };
        crate::log_warn!("Connection lost: {}", reason);
        let mut notice = Notice::new(format!("Connection lost: {}", reason));
        if let Some(endpoint) = endpoint {
            notice = notice.with_endpoint(endpoint);
        }
        self.bus.publish(notice);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let slot = self.link.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(pump) = slot.pump.take() {
            pump.abort();
        }
    }
}

/// Feed inbound transport events to the registry, strictly in arrival order.
async fn pump_inbound(
    inner: Weak<Inner>,
    epoch: u64,
    mut inbound: BoxStream<'static, TransportEvent>,
) {
    let mut code = None;
    let mut reason = String::from("transport stream ended");

    while let Some(event) = inbound.next().await {
        let Some(manager) = inner.upgrade() else {
            return;
        };
        if !manager.is_live(epoch) {
            return;
        }
        match event {
            TransportEvent::Message(text) => manager.handle_frame(&text),
            TransportEvent::Error(e) => {
                crate::log_warn!("Transport error: {}", e);
                reason = e;
            }
            TransportEvent::Closed {
                code: close_code,
                reason: close_reason,
            } => {
                code = close_code;
                reason = close_reason;
                break;
            }
        }
    }

    if let Some(manager) = inner.upgrade() {
        manager.handle_close(epoch, code, reason);
    }
}
