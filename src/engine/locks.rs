use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::OwnerDay;

/// Async mutex per `(owner, date)`. Slots exist only while someone holds or waits on them.
///
/// Cloning shares the table, so a guard can outlive the borrow it was taken through.
#[derive(Clone, Default)]
pub struct OwnerDayLocks {
    slots: Arc<DashMap<OwnerDay, Arc<Mutex<()>>>>,
}

/// Held for the whole check-then-insert (or cancel) of one owner-day.
#[derive(Debug)]
pub struct OwnerDayGuard {
    slots: Arc<DashMap<OwnerDay, Arc<Mutex<()>>>>,
    key: OwnerDay,
    guard: Option<OwnedMutexGuard<()>>,
}

impl OwnerDayLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: OwnerDay) -> OwnerDayGuard {
        // Clone out of the map before awaiting so no shard lock is held across the wait.
        let slot = self.slots.entry(key.clone()).or_default().value().clone();
        // Built before the wait: dropping this future mid-wait still runs the slot cleanup.
        let mut pending = OwnerDayGuard {
            slots: self.slots.clone(),
            key,
            guard: None,
        };
        pending.guard = Some(slot.lock_owned().await);
        pending
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Drop for OwnerDayGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left: nobody holds or waits on this slot.
        // `remove_if` runs under the shard lock, so no new waiter can clone it meanwhile.
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}
