//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chatline_client::notifications::{NotificationBus, NotificationEvent};
use chatline_client::ws::{SessionContext, Transport, TransportEvent, TransportLink};
use chatline_shared::TransportError;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};

/// Transport double. Clones share state, so a test keeps one clone to script
/// the handshake and hands the other to the manager.
#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

struct Shared {
    opens: AtomicUsize,
    /// `true` lets handshakes complete
    gate: watch::Sender<bool>,
    failures: Mutex<VecDeque<TransportError>>,
    remotes: Mutex<VecDeque<RemoteEnd>>,
}

/// Server side of one opened link.
pub struct RemoteEnd {
    written: UnboundedReceiver<String>,
    events: UnboundedSender<TransportEvent>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                opens: AtomicUsize::new(0),
                gate,
                failures: Mutex::new(VecDeque::new()),
                remotes: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Number of `open` calls so far
    pub fn opens(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Make handshakes hang until [`MockTransport::release`]
    pub fn hold(&self) {
        self.shared.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.shared.gate.send_replace(true);
    }

    /// The next handshake fails with `err`
    pub fn fail_next(&self, err: TransportError) {
        self.shared.failures.lock().unwrap().push_back(err);
    }

    /// Server end of the oldest link not yet taken
    pub fn take_remote(&self) -> RemoteEnd {
        self.shared
            .remotes
            .lock()
            .unwrap()
            .pop_front()
            .expect("no link was opened")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _session: &SessionContext) -> Result<TransportLink, TransportError> {
        self.shared.opens.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.shared.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if let Some(err) = self.shared.failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let (outbound, written) = unbounded();
        let (events, inbound) = unbounded();
        self.shared
            .remotes
            .lock()
            .unwrap()
            .push_back(RemoteEnd { written, events });
        Ok(TransportLink {
            outbound,
            inbound: inbound.boxed(),
        })
    }
}

impl RemoteEnd {
    pub fn push(&self, text: &str) {
        self.events
            .unbounded_send(TransportEvent::Message(text.to_string()))
            .expect("client dropped the link");
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.events.unbounded_send(TransportEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    /// Next frame the client wrote, without waiting
    pub fn try_written(&mut self) -> Option<String> {
        match self.written.try_next() {
            Ok(Some(frame)) => Some(frame),
            _ => None,
        }
    }

    /// Next frame the client writes
    pub async fn next_written(&mut self) -> Option<String> {
        within(self.written.next()).await
    }

    /// True once the client dropped its sending half and all frames were read
    pub fn client_closed(&mut self) -> bool {
        loop {
            match self.written.try_next() {
                Ok(Some(_)) => continue,
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }
}

/// Collects everything published on `bus`.
pub fn notice_recorder(bus: &NotificationBus) -> mpsc::UnboundedReceiver<NotificationEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    // Kept for the life of the bus.
    let _subscription = bus.subscribe(move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

/// Await `fut` with a generous upper bound so a broken test fails instead of
/// hanging.
pub async fn within<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(60), fut)
        .await
        .expect("timed out")
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
