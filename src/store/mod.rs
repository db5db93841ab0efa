mod commit;
mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

/// Resolves bookable resources and their owners.
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    /// The resource, only if it exists and is active.
    async fn find_active_resource(&self, id: Ulid) -> Result<Option<Resource>, StoreError>;

    /// The resource regardless of its active flag.
    async fn get_resource(&self, id: Ulid) -> Result<Option<Resource>, StoreError>;

    async fn register_resource(&self, resource: Resource) -> Result<Resource, StoreError>;

    async fn update_resource(&self, id: Ulid, update: ResourceUpdate) -> Result<Resource, StoreError>;

    async fn list_resources(&self) -> Result<Vec<Resource>, StoreError>;
}

/// Durable table of schedule entries.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Every non-cancelled entry for `owner` on `date`, across all resources,
    /// in insertion order.
    async fn find_non_cancelled_by_owner_and_date(
        &self,
        owner: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScheduleEntry>, StoreError>;

    /// Persist a candidate: new id, zero bookings, not cancelled, fresh timestamps.
    async fn insert(&self, candidate: NewSchedule) -> Result<ScheduleEntry, StoreError>;

    async fn get(&self, id: Ulid) -> Result<Option<ScheduleEntry>, StoreError>;

    /// Tombstone an entry. Fails on unknown or already-cancelled ids.
    async fn cancel(&self, id: Ulid, reason: Option<String>) -> Result<ScheduleEntry, StoreError>;

    /// Entries for `owner` on `date`, cancelled ones included.
    async fn list_by_owner_and_date(
        &self,
        owner: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScheduleEntry>, StoreError>;

    /// Entries for a resource ordered by date then start.
    async fn list_by_resource(&self, resource_id: Ulid) -> Result<Vec<ScheduleEntry>, StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    AlreadyCancelled(Ulid),
    LimitExceeded(&'static str),
    Wal(String),
    /// A detached write task panicked or was cancelled before finishing.
    Aborted(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "not found: {id}"),
            StoreError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            StoreError::AlreadyCancelled(id) => write!(f, "already cancelled: {id}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::Wal(e) => write!(f, "WAL error: {e}"),
            StoreError::Aborted(e) => write!(f, "write task aborted: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
