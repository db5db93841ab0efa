use chrono::{NaiveDate, NaiveTime};

use crate::model::ScheduleEntry;
use crate::store::{ScheduleStore, StoreError};

/// Half-open overlap: `[a_start, a_end)` and `[b_start, b_end)` share an instant.
/// Back-to-back intervals (`a_end == b_start`) do not overlap.
pub fn overlaps<T: Ord>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && a_end > b_start
}

/// Result of a conflict check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictCheck {
    Clear,
    /// The first overlapping entry in store order.
    Conflict(ScheduleEntry),
}

/// Decides whether a candidate window collides with the owner's live entries that day.
///
/// Reports only the first overlapping entry; callers wanting every conflict
/// must enumerate themselves.
pub struct ConflictDetector<'a> {
    store: &'a dyn ScheduleStore,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(store: &'a dyn ScheduleStore) -> Self {
        Self { store }
    }

    pub async fn check(
        &self,
        owner: &str,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<ConflictCheck, StoreError> {
        let candidates = self
            .store
            .find_non_cancelled_by_owner_and_date(owner, date)
            .await?;
        Ok(candidates
            .into_iter()
            .find(|existing| overlaps(start, end, existing.start, existing.end))
            .map_or(ConflictCheck::Clear, ConflictCheck::Conflict))
    }
}
