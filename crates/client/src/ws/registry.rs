//! Ordered set of inbound message observers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatline_shared::{MessageEnvelope, ObserverError};

/// Receives every dispatched envelope. Implemented for plain closures.
pub trait Observer: Send + Sync {
    fn on_envelope(&self, envelope: &MessageEnvelope) -> Result<(), ObserverError>;
}

impl<F> Observer for F
where
    F: Fn(&MessageEnvelope) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_envelope(&self, envelope: &MessageEnvelope) -> Result<(), ObserverError> {
        self(envelope)
    }
}

/// Observer capability. Identity is the allocation, so keep a clone of the
/// `Arc` to unsubscribe later.
pub type ObserverRef = Arc<dyn Observer>;

/// Wrap a closure as an [`ObserverRef`].
pub fn observer<F>(f: F) -> ObserverRef
where
    F: Fn(&MessageEnvelope) -> Result<(), ObserverError> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    observers: Mutex<Vec<ObserverRef>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn observers(&self) -> MutexGuard<'_, Vec<ObserverRef>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an observer. Returns false if it is already registered.
    pub fn subscribe(&self, observer: ObserverRef) -> bool {
        let mut observers = self.observers();
        if observers.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            return false;
        }
        observers.push(observer);
        true
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn unsubscribe(&self, observer: &ObserverRef) -> bool {
        let mut observers = self.observers();
        let before = observers.len();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        observers.len() != before
    }

    /// Hand `envelope` to every observer registered at call time, in
    /// subscription order. A failing or panicking observer is logged and
    /// skipped; the rest still run.
    pub fn dispatch(&self, envelope: &MessageEnvelope) {
        let snapshot: Vec<ObserverRef> = self.observers().clone();

        for (index, observer) in snapshot.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_envelope(envelope)))
                .unwrap_or_else(|panic| Err(ObserverError::Panicked(panic_message(&*panic))));

            if let Err(e) = outcome {
                crate::log_warn!(
                    "Observer #{} failed on '{}' message: {}",
                    index,
                    envelope.kind(),
                    e
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.observers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers().is_empty()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
