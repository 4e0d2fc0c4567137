//! Device network reachability.
//!
//! A sensor reports [`NetworkSnapshot`]s; the [`ReachabilityMonitor`] folds
//! them into a single process-wide `offline` flag and publishes it only when
//! it flips. The flag drives a persistent banner and is never routed through
//! the notification queue.

use std::time::Duration;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// One sensor reading. `None` means the platform does not know (yet).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub is_connected: Option<bool>,
    pub is_internet_reachable: Option<bool>,
}

impl NetworkSnapshot {
    pub fn online() -> Self {
        Self {
            is_connected: Some(true),
            is_internet_reachable: Some(true),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            is_connected: Some(false),
            is_internet_reachable: Some(false),
        }
    }

    /// Offline unless the link is up and internet reachability is not
    /// explicitly denied.
    pub fn is_offline(&self) -> bool {
        !(self.is_connected == Some(true) && self.is_internet_reachable != Some(false))
    }
}

/// Source of connectivity readings.
pub trait ReachabilitySensor: Send + 'static {
    /// Start observing. Called once, for the life of the process.
    fn observe(self) -> BoxStream<'static, NetworkSnapshot>;
}

/// Sensor fed by the host platform through a [`SensorHandle`].
pub struct ChannelSensor {
    receiver: UnboundedReceiver<NetworkSnapshot>,
}

/// Callback side of a [`ChannelSensor`].
#[derive(Clone)]
pub struct SensorHandle {
    sender: UnboundedSender<NetworkSnapshot>,
}

impl ChannelSensor {
    pub fn new() -> (Self, SensorHandle) {
        let (sender, receiver) = unbounded();
        (Self { receiver }, SensorHandle { sender })
    }
}

impl SensorHandle {
    /// Forward one platform callback. Returns false once the monitor is gone.
    pub fn report(&self, snapshot: NetworkSnapshot) -> bool {
        self.sender.unbounded_send(snapshot).is_ok()
    }
}

impl ReachabilitySensor for ChannelSensor {
    fn observe(self) -> BoxStream<'static, NetworkSnapshot> {
        self.receiver.boxed()
    }
}

/// Native sensor: periodically opens a TCP connection to a well-known address.
#[derive(Debug, Clone)]
pub struct TcpProbeSensor {
    addr: String,
    interval: Duration,
    timeout: Duration,
}

impl TcpProbeSensor {
    pub fn new(addr: impl Into<String>, interval: Duration) -> Self {
        Self {
            addr: addr.into(),
            interval,
            timeout: Duration::from_secs(3),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl ReachabilitySensor for TcpProbeSensor {
    fn observe(self) -> BoxStream<'static, NetworkSnapshot> {
        let ticker = tokio::time::interval(self.interval);
        stream::unfold((self, ticker), |(probe, mut ticker)| async move {
            ticker.tick().await;
            let reachable = matches!(
                tokio::time::timeout(probe.timeout, TcpStream::connect(probe.addr.as_str())).await,
                Ok(Ok(_))
            );
            crate::log_debug!("Reachability probe to {}: {}", probe.addr, reachable);
            let snapshot = NetworkSnapshot {
                is_connected: Some(reachable),
                is_internet_reachable: None,
            };
            Some((snapshot, (probe, ticker)))
        })
        .boxed()
    }
}

/// Owner of the process-wide `offline` flag.
pub struct ReachabilityMonitor {
    offline: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl ReachabilityMonitor {
    /// Take ownership of `sensor` and start folding its readings. Until the
    /// first reading arrives the device is assumed online.
    pub fn spawn(sensor: impl ReachabilitySensor) -> Self {
        let (offline_tx, offline) = watch::channel(false);
        let mut readings = sensor.observe();

        let task = tokio::spawn(async move {
            while let Some(snapshot) = readings.next().await {
                let offline = snapshot.is_offline();
                let flipped = offline_tx.send_if_modified(|current| {
                    if *current == offline {
                        return false;
                    }
                    *current = offline;
                    true
                });
                if flipped {
                    crate::log_info!("Network is now {}", if offline { "offline" } else { "online" });
                }
            }
            crate::log_debug!("Reachability sensor stream ended");
        });

        Self { offline, task }
    }

    pub fn is_offline(&self) -> bool {
        *self.offline.borrow()
    }

    /// Push-style view of the flag; notified only when it flips.
    pub fn offline(&self) -> watch::Receiver<bool> {
        self.offline.clone()
    }
}

impl Drop for ReachabilityMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_rule() {
        assert!(!NetworkSnapshot::online().is_offline());
        assert!(NetworkSnapshot::disconnected().is_offline());
        // Unknown internet reachability does not count as offline.
        assert!(!NetworkSnapshot {
            is_connected: Some(true),
            is_internet_reachable: None,
        }
        .is_offline());
        assert!(NetworkSnapshot {
            is_connected: Some(true),
            is_internet_reachable: Some(false),
        }
        .is_offline());
        assert!(NetworkSnapshot::default().is_offline());
    }

    #[tokio::test]
    async fn assumes_online_until_first_reading() {
        let (sensor, _handle) = ChannelSensor::new();
        let monitor = ReachabilityMonitor::spawn(sensor);
        assert!(!monitor.is_offline());
    }

    #[tokio::test]
    async fn publishes_only_on_change() {
        let (sensor, handle) = ChannelSensor::new();
        let monitor = ReachabilityMonitor::spawn(sensor);
        let mut offline = monitor.offline();

        handle.report(NetworkSnapshot::online());
        handle.report(NetworkSnapshot::disconnected());
        offline.wait_for(|o| *o).await.unwrap();

        // Repeated identical readings must not wake the view.
        handle.report(NetworkSnapshot::disconnected());
        handle.report(NetworkSnapshot::disconnected());
        handle.report(NetworkSnapshot::online());
        offline.changed().await.unwrap();
        assert!(!*offline.borrow_and_update());
        assert!(!offline.has_changed().unwrap());
    }
}
