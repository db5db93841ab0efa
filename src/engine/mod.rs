mod conflict;
mod error;
mod locks;
mod mutations;
mod queries;

pub use conflict::{overlaps, ConflictCheck, ConflictDetector};
pub use error::{EngineError, ScheduleError};
pub use locks::{OwnerDayGuard, OwnerDayLocks};

use std::sync::Arc;

use crate::store::{MemoryStore, ResourceCatalog, ScheduleStore};

/// Class scheduling front door.
///
/// Creation runs: interval check → catalog lookup → lock `(owner, date)` →
/// active re-check → conflict check → insert → unlock. Cancellation takes the
/// same lock, so a tombstone and a new booking for that owner-day never
/// interleave. Both locked sections run as detached tasks and finish even if
/// the caller is dropped.
pub struct Engine {
    catalog: Arc<dyn ResourceCatalog>,
    store: Arc<dyn ScheduleStore>,
    locks: OwnerDayLocks,
}

impl Engine {
    pub fn new(catalog: Arc<dyn ResourceCatalog>, store: Arc<dyn ScheduleStore>) -> Self {
        Self {
            catalog,
            store,
            locks: OwnerDayLocks::new(),
        }
    }

    /// Engine whose catalog and schedule table both live in one WAL-backed store.
    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        Self::new(store.clone(), store)
    }

    /// Owner-day locks currently held or awaited.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }
}
