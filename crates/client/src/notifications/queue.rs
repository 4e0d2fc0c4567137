use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::bus::{BusSubscription, NotificationBus};
use super::event::NotificationEvent;

/// How long a notification stays visible when nobody dismisses it
pub const DEFAULT_DISPLAY_FOR: Duration = Duration::from_millis(5000);

/// Backlog plus the single active slot.
///
/// The backlog is kept sorted by `seq`; at most one event is active.
#[derive(Debug, Default, Clone)]
pub struct NotificationQueueState {
    backlog: VecDeque<NotificationEvent>,
    active: Option<NotificationEvent>,
}

impl NotificationQueueState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the backlog in sequence order.
    /// Returns false if an event with the same `seq` is already known.
    pub fn enqueue(&mut self, event: NotificationEvent) -> bool {
        if self.active.as_ref().is_some_and(|a| a.seq == event.seq) {
            return false;
        }
        match self.backlog.back() {
            Some(last) if last.seq >= event.seq => {
                match self.backlog.binary_search_by(|e| e.seq.cmp(&event.seq)) {
                    Ok(_) => return false,
                    Err(pos) => self.backlog.insert(pos, event),
                }
            }
            _ => self.backlog.push_back(event),
        }
        true
    }

    /// Move the oldest backlog event into the active slot if the slot is empty.
    /// Returns the newly active event.
    pub fn promote(&mut self) -> Option<&NotificationEvent> {
        if self.active.is_some() {
            return None;
        }
        self.active = self.backlog.pop_front();
        self.active.as_ref()
    }

    /// Clear the active slot if it holds `seq`.
    pub fn dismiss(&mut self, seq: u64) -> bool {
        if self.active.as_ref().is_some_and(|a| a.seq == seq) {
            self.active = None;
            true
        } else {
            false
        }
    }

    pub fn active(&self) -> Option<&NotificationEvent> {
        self.active.as_ref()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.backlog.is_empty()
    }
}

enum QueueCommand {
    Enqueue(NotificationEvent),
    Dismiss(u64),
}

/// Drains the [`NotificationBus`] into a one-at-a-time visible surface.
///
/// Every published event is shown exactly once, in `seq` order, until it is
/// dismissed or `display_for` elapses. Dropping the queue detaches it from
/// the bus and stops its task.
pub struct DeliveryQueue {
    commands: mpsc::UnboundedSender<QueueCommand>,
    active: watch::Receiver<Option<NotificationEvent>>,
    subscription: BusSubscription,
    task: JoinHandle<()>,
}

impl DeliveryQueue {
    /// Subscribe to `bus` and start the delivery task on the current runtime.
    pub fn spawn(bus: &NotificationBus, display_for: Duration) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (active_tx, active) = watch::channel(None);

        let enqueue = commands.clone();
        let subscription = bus.subscribe(move |event| {
            let _ = enqueue.send(QueueCommand::Enqueue(event.clone()));
        });

        let task = tokio::spawn(run_delivery(receiver, active_tx, display_for));

        Self {
            commands,
            active,
            subscription,
            task,
        }
    }

    /// Push-style view of the active slot
    pub fn active(&self) -> watch::Receiver<Option<NotificationEvent>> {
        self.active.clone()
    }

    /// The currently visible notification, if any
    pub fn current(&self) -> Option<NotificationEvent> {
        self.active.borrow().clone()
    }

    /// Dismiss the notification with this `seq` if it is the active one.
    pub fn dismiss(&self, seq: u64) {
        let _ = self.commands.send(QueueCommand::Dismiss(seq));
    }

    pub fn dismiss_current(&self) {
        let seq = self.active.borrow().as_ref().map(|e| e.seq);
        if let Some(seq) = seq {
            self.dismiss(seq);
        }
    }
}

impl Drop for DeliveryQueue {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
        self.task.abort();
    }
}

async fn run_delivery(
    mut commands: mpsc::UnboundedReceiver<QueueCommand>,
    active_tx: watch::Sender<Option<NotificationEvent>>,
    display_for: Duration,
) {
    let mut state = NotificationQueueState::new();
    let mut deadline: Option<Instant> = None;

    loop {
        if let Some(event) = state.promote() {
            crate::log_debug!("Showing notification #{}: {}", event.seq, event.message);
            active_tx.send_replace(Some(event.clone()));
            deadline = Some(Instant::now() + display_for);
        }

        let expired = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        let cleared = tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                let mut cleared = apply(&mut state, command);
                // Take whatever else is already waiting so the lowest seq is
                // promoted next, whatever order the commands arrived in.
                while let Ok(command) = commands.try_recv() {
                    cleared |= apply(&mut state, command);
                }
                cleared
            }
            _ = expired => match state.active().map(|e| e.seq) {
                Some(seq) => state.dismiss(seq),
                None => false,
            },
        };

        if cleared {
            deadline = None;
            active_tx.send_replace(None);
        }
    }
}

/// Returns true if the command cleared the active slot.
fn apply(state: &mut NotificationQueueState, command: QueueCommand) -> bool {
    match command {
        QueueCommand::Enqueue(event) => {
            state.enqueue(event);
            false
        }
        QueueCommand::Dismiss(seq) => state.dismiss(seq),
    }
}
