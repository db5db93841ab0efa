use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::wal::Wal;

use super::commit::{wal_writer_loop, WalCommand};
use super::{ResourceCatalog, ScheduleStore, StoreError};

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// In-memory tables, mutated only by applying WAL events.
#[derive(Default)]
struct Tables {
    resources: DashMap<Ulid, Resource>,
    entries: DashMap<Ulid, ScheduleEntry>,
    /// Entry ids per owner-day, in insertion order. Tombstones stay listed.
    by_owner_day: DashMap<OwnerDay, Vec<Ulid>>,
    by_resource: DashMap<Ulid, Vec<Ulid>>,
}

impl Tables {
    fn apply(&self, event: &Event) {
        match event {
            Event::ResourceRegistered { id, owner, active, name }
            | Event::ResourceUpdated { id, owner, active, name } => {
                self.resources.insert(
                    *id,
                    Resource {
                        id: *id,
                        owner: owner.clone(),
                        active: *active,
                        name: name.clone(),
                    },
                );
            }
            Event::ScheduleCreated { entry } => {
                self.entries.insert(entry.id, entry.clone());
                self.by_owner_day
                    .entry(OwnerDay::new(&entry.owner, entry.date))
                    .or_default()
                    .push(entry.id);
                self.by_resource.entry(entry.resource_id).or_default().push(entry.id);
            }
            Event::ScheduleCancelled { id, reason, at } => {
                if let Some(mut entry) = self.entries.get_mut(id) {
                    entry.cancelled = true;
                    entry.cancellation_reason = reason.clone();
                    entry.updated_at = *at;
                }
            }
        }
    }

    fn collect(&self, ids: &[Ulid]) -> Vec<ScheduleEntry> {
        ids.iter()
            .filter_map(|id| self.entries.get(id).map(|e| e.value().clone()))
            .collect()
    }

    fn owner_day_entries(&self, owner: &str, date: NaiveDate) -> Vec<ScheduleEntry> {
        let ids = self
            .by_owner_day
            .get(&OwnerDay::new(owner, date))
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        self.collect(&ids)
    }

    /// Minimal event list that rebuilds the current state, preserving the
    /// per-owner-day insertion order.
    fn snapshot_events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .resources
            .iter()
            .map(|r| Event::ResourceRegistered {
                id: r.id,
                owner: r.owner.clone(),
                active: r.active,
                name: r.name.clone(),
            })
            .collect();
        for slot in self.by_owner_day.iter() {
            for entry in self.collect(slot.value()) {
                events.push(Event::ScheduleCreated { entry });
            }
        }
        events
    }
}

async fn wal_append(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), StoreError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
        .map_err(|e| StoreError::Wal(e.to_string()))
}

async fn append_then_apply<H>(
    tables: Arc<Tables>,
    wal_tx: mpsc::Sender<WalCommand>,
    barrier: Arc<RwLock<()>>,
    event: Event,
    held: H,
) -> Result<(), StoreError> {
    let _barrier = barrier.read_owned().await;
    wal_append(&wal_tx, &event).await?;
    tables.apply(&event);
    drop(held);
    Ok(())
}

/// Catalog and schedule table held in memory, made durable by the WAL.
///
/// Every mutation is appended (group commit, fsync) before it is applied, and
/// the whole state is rebuilt by replaying the log on open.
pub struct MemoryStore {
    tables: Arc<Tables>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Shared by writers for append+apply, exclusive for a compaction snapshot.
    barrier: Arc<RwLock<()>>,
    catalog_writes: Arc<Mutex<()>>,
}

impl MemoryStore {
    /// Replay `wal_path` and start the group-commit writer. Must run inside a tokio runtime.
    pub fn open(wal_path: &Path) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let wal = Wal::open(wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let tables = Tables::default();
        for event in &events {
            tables.apply(event);
        }
        debug!(
            events = events.len(),
            resources = tables.resources.len(),
            entries = tables.entries.len(),
            "replayed WAL {}",
            wal_path.display()
        );
        Ok(Self {
            tables: Arc::new(tables),
            wal_tx,
            barrier: Arc::new(RwLock::new(())),
            catalog_writes: Arc::new(Mutex::new(())),
        })
    }

    /// Append `event` and apply it as one detached unit: once started it runs to
    /// completion even if the caller stops waiting, so a logged event is always
    /// applied. `held` is released only after the apply.
    async fn persist_and_apply<H: Send + 'static>(&self, event: Event, held: H) -> Result<(), StoreError> {
        tokio::spawn(append_then_apply(
            self.tables.clone(),
            self.wal_tx.clone(),
            self.barrier.clone(),
            event,
            held,
        ))
        .await
        .map_err(|e| StoreError::Aborted(e.to_string()))?
    }

    /// Rewrite the WAL as a snapshot of the current state.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let _barrier = self.barrier.write().await;
        let events = self.tables.snapshot_events();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    /// Appends since the last compaction (or open). Zero if the writer is gone.
    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl ResourceCatalog for MemoryStore {
    async fn find_active_resource(&self, id: Ulid) -> Result<Option<Resource>, StoreError> {
        Ok(self
            .tables
            .resources
            .get(&id)
            .filter(|r| r.active)
            .map(|r| r.value().clone()))
    }

    async fn get_resource(&self, id: Ulid) -> Result<Option<Resource>, StoreError> {
        Ok(self.tables.resources.get(&id).map(|r| r.value().clone()))
    }

    async fn register_resource(&self, resource: Resource) -> Result<Resource, StoreError> {
        let writes = self.catalog_writes.clone().lock_owned().await;
        if self.tables.resources.contains_key(&resource.id) {
            return Err(StoreError::AlreadyExists(resource.id));
        }
        if self.tables.resources.len() >= MAX_RESOURCES {
            return Err(StoreError::LimitExceeded("too many resources"));
        }
        self.persist_and_apply(
            Event::ResourceRegistered {
                id: resource.id,
                owner: resource.owner.clone(),
                active: resource.active,
                name: resource.name.clone(),
            },
            writes,
        )
        .await?;
        Ok(resource)
    }

    async fn update_resource(&self, id: Ulid, update: ResourceUpdate) -> Result<Resource, StoreError> {
        let writes = self.catalog_writes.clone().lock_owned().await;
        let current = self
            .tables
            .resources
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound(id))?;
        let updated = Resource {
            id,
            owner: update.owner.unwrap_or(current.owner),
            active: update.active.unwrap_or(current.active),
            name: update.name.or(current.name),
        };
        self.persist_and_apply(
            Event::ResourceUpdated {
                id,
                owner: updated.owner.clone(),
                active: updated.active,
                name: updated.name.clone(),
            },
            writes,
        )
        .await?;
        Ok(updated)
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, StoreError> {
        let mut resources: Vec<Resource> = self.tables.resources.iter().map(|r| r.value().clone()).collect();
        resources.sort_by_key(|r| r.id);
        Ok(resources)
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn find_non_cancelled_by_owner_and_date(
        &self,
        owner: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScheduleEntry>, StoreError> {
        let mut entries = self.tables.owner_day_entries(owner, date);
        entries.retain(|e| !e.cancelled);
        Ok(entries)
    }

    async fn insert(&self, candidate: NewSchedule) -> Result<ScheduleEntry, StoreError> {
        let key = OwnerDay::new(&candidate.owner, candidate.date);
        if self
            .tables
            .by_owner_day
            .get(&key)
            .is_some_and(|ids| ids.len() >= MAX_ENTRIES_PER_OWNER_DAY)
        {
            return Err(StoreError::LimitExceeded("too many entries for owner on date"));
        }

        let now = now_ms();
        let entry = ScheduleEntry {
            id: Ulid::new(),
            resource_id: candidate.resource_id,
            owner: candidate.owner,
            date: candidate.date,
            start: candidate.start,
            end: candidate.end,
            current_bookings: 0,
            cancelled: false,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.persist_and_apply(Event::ScheduleCreated { entry: entry.clone() }, ())
            .await?;
        Ok(entry)
    }

    async fn get(&self, id: Ulid) -> Result<Option<ScheduleEntry>, StoreError> {
        Ok(self.tables.entries.get(&id).map(|e| e.value().clone()))
    }

    async fn cancel(&self, id: Ulid, reason: Option<String>) -> Result<ScheduleEntry, StoreError> {
        let current = self
            .tables
            .entries
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NotFound(id))?;
        if current.cancelled {
            return Err(StoreError::AlreadyCancelled(id));
        }
        let at = now_ms();
        self.persist_and_apply(
            Event::ScheduleCancelled {
                id,
                reason: reason.clone(),
                at,
            },
            (),
        )
        .await?;
        Ok(ScheduleEntry {
            cancelled: true,
            cancellation_reason: reason,
            updated_at: at,
            ..current
        })
    }

    async fn list_by_owner_and_date(
        &self,
        owner: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScheduleEntry>, StoreError> {
        Ok(self.tables.owner_day_entries(owner, date))
    }

    async fn list_by_resource(&self, resource_id: Ulid) -> Result<Vec<ScheduleEntry>, StoreError> {
        let ids = self
            .tables
            .by_resource
            .get(&resource_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        let mut entries = self.tables.collect(&ids);
        entries.sort_by_key(|e| (e.date, e.start));
        Ok(entries)
    }
}
