use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};

use super::event::{Notice, NotificationEvent};

type Listener = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;

/// Publish point for user-facing failure and status events.
///
/// The bus has no queue of its own: `publish` stamps the notice with the next
/// sequence id and calls every listener synchronously, in registration
/// order. Cloning yields another handle to the same bus.
///
/// Every listener sees events in ascending `seq` order. A listener that
/// publishes re-entrantly gets its event delivered right after the current
/// one has reached every listener, before the outer `publish` returns.
/// Publishers on other threads wait for the delivery in progress.
#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next_listener_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
    pending: Mutex<Pending>,
    /// Held by the delivering thread for the whole fan-out
    fanout: Mutex<()>,
}

#[derive(Default)]
struct Pending {
    last_seq: u64,
    events: VecDeque<NotificationEvent>,
    deliverer: Option<ThreadId>,
}

impl BusInner {
    fn listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_event(&self) -> Option<NotificationEvent> {
        self.pending().events.pop_front()
    }
}

/// Clears the deliverer mark even if a listener panics.
struct Delivering<'a>(&'a BusInner);

impl Drop for Delivering<'_> {
    fn drop(&mut self) {
        self.0.pending().deliverer = None;
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a notice and return the sequence id it was given.
    pub fn publish(&self, notice: impl Into<Notice>) -> u64 {
        let me = thread::current().id();
        let (seq, reentrant) = {
            let mut pending = self.inner.pending();
            pending.last_seq += 1;
            let seq = pending.last_seq;
            let event = NotificationEvent::stamp(seq, notice.into());
            crate::log_debug!("Notification #{}: {}", seq, event.message);
            pending.events.push_back(event);
            (seq, pending.deliverer == Some(me))
        };
        if reentrant {
            // The fan-out loop below us picks it up in order.
            return seq;
        }

        let _fanout = self.inner.fanout.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.pending().deliverer = Some(me);
        let _delivering = Delivering(&self.inner);

        while let Some(event) = self.inner.next_event() {
            // Listeners may subscribe or unsubscribe re-entrantly; call them
            // without holding the listener lock.
            let listeners: Vec<Listener> = self
                .inner
                .listeners()
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect();
            for listener in listeners {
                listener(&event);
            }
        }
        seq
    }

    /// Register a listener. The returned handle removes exactly this listener.
    pub fn subscribe(
        &self,
        listener: impl Fn(&NotificationEvent) + Send + Sync + 'static,
    ) -> BusSubscription {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners().push((id, Arc::new(listener)));
        BusSubscription {
            bus: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }
}

/// Capability returned by [`NotificationBus::subscribe`].
///
/// Dropping it does not unsubscribe; call [`BusSubscription::unsubscribe`].
#[derive(Debug)]
pub struct BusSubscription {
    bus: Weak<BusInner>,
    id: u64,
}

impl BusSubscription {
    /// Remove the listener. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.listeners().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(bus: &NotificationBus, tag: &'static str, log: &Arc<Mutex<Vec<String>>>) -> BusSubscription {
        let log = log.clone();
        bus.subscribe(move |event| {
            log.lock().unwrap().push(format!("{}:{}:{}", tag, event.seq, event.message));
        })
    }

    #[test]
    fn publish_fans_out_in_registration_order() {
        let bus = NotificationBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = recorder(&bus, "a", &log);
        let _b = recorder(&bus, "b", &log);

        assert_eq!(bus.publish("first"), 1);
        assert_eq!(bus.publish(Notice::new("second").with_status(500)), 2);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:1:first", "b:1:first", "a:2:second", "b:2:second"]
        );
    }

    #[test]
    fn unsubscribe_removes_only_that_listener_and_is_idempotent() {
        let bus = NotificationBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&bus, "a", &log);
        let _b = recorder(&bus, "b", &log);

        a.unsubscribe();
        a.unsubscribe();
        assert_eq!(bus.listener_count(), 1);

        bus.publish("only b");
        assert_eq!(*log.lock().unwrap(), vec!["b:1:only b"]);
    }

    #[test]
    fn sequence_ids_keep_increasing_without_listeners() {
        let bus = NotificationBus::new();
        bus.publish("x");
        bus.publish("x");
        assert_eq!(bus.publish("x"), 3);
    }

    #[test]
    fn listener_may_publish_reentrantly() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner_bus = bus.clone();
        let seen_clone = seen.clone();
        let _sub = bus.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.seq);
            if event.seq == 1 {
                inner_bus.publish("follow-up");
            }
        });

        bus.publish("start");
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn reentrant_publish_reaches_every_listener_after_the_current_event() {
        let bus = NotificationBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_bus = bus.clone();
        let first_log = log.clone();
        let _a = bus.subscribe(move |event| {
            first_log.lock().unwrap().push(format!("a:{}", event.seq));
            if event.seq == 1 {
                assert_eq!(inner_bus.publish("follow-up"), 2);
            }
        });
        let _b = recorder(&bus, "b", &log);

        assert_eq!(bus.publish("original"), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:1", "b:1:original", "a:2", "b:2:follow-up"]
        );
    }

    #[test]
    fn concurrent_publishers_deliver_in_seq_order() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = bus.subscribe(move |event| seen_clone.lock().unwrap().push(event.seq));

        let publishers: Vec<_> = (0..8)
            .map(|_| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        bus.publish("tick");
                    }
                })
            })
            .collect();
        for publisher in publishers {
            publisher.join().unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (1..=400).collect::<Vec<u64>>());
    }

    #[test]
    fn panicking_listener_does_not_wedge_the_bus() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = bus.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.seq);
            if event.seq == 1 {
                panic!("listener bug");
            }
        });

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| bus.publish("boom")));
        assert!(outcome.is_err());

        bus.publish("after");
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn subscription_outliving_bus_is_harmless() {
        let sub = {
            let bus = NotificationBus::new();
            bus.subscribe(|_| {})
        };
        sub.unsubscribe();
    }
}
