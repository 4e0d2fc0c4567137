use tokio::sync::watch;

use super::event::NotificationEvent;

/// What the view renders: the one active notification and, independently,
/// the offline banner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    pub notification: Option<NotificationEvent>,
    pub offline: bool,
}

/// Merges the delivery queue's active slot with the reachability flag.
///
/// The two sources stay independent: the banner is shown alongside whatever
/// notification is active and never waits its turn in the queue.
pub struct StatusBoard {
    active: watch::Receiver<Option<NotificationEvent>>,
    offline: watch::Receiver<bool>,
}

impl StatusBoard {
    pub fn new(
        active: watch::Receiver<Option<NotificationEvent>>,
        offline: watch::Receiver<bool>,
    ) -> Self {
        Self { active, offline }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            notification: self.active.borrow().clone(),
            offline: *self.offline.borrow(),
        }
    }

    /// Wait until either source changes and return the new snapshot.
    /// Returns `None` once both sources are gone.
    pub async fn changed(&mut self) -> Option<StatusSnapshot> {
        let changed = tokio::select! {
            res = self.active.changed() => res.is_ok() || self.offline.changed().await.is_ok(),
            res = self.offline.changed() => res.is_ok() || self.active.changed().await.is_ok(),
        };
        if !changed {
            return None;
        }
        // Mark both as seen so the next call waits for a fresh change.
        self.active.borrow_and_update();
        self.offline.borrow_and_update();
        Some(self.snapshot())
    }
}
