use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{
    SCHEDULES_CANCELLED_TOTAL, SCHEDULES_CREATED_TOTAL, SCHEDULE_CREATE_DURATION_SECONDS,
    SCHEDULE_REJECTIONS_TOTAL,
};
use crate::store::{ResourceCatalog, ScheduleStore, StoreError};

use super::{ConflictCheck, ConflictDetector, Engine, EngineError, OwnerDayLocks, ScheduleError};

fn validate_owner(owner: &str) -> Result<(), EngineError> {
    if owner.trim().is_empty() {
        return Err(EngineError::InvalidInput("owner must not be empty"));
    }
    if owner.len() > MAX_OWNER_LEN {
        return Err(EngineError::LimitExceeded("owner too long"));
    }
    Ok(())
}

fn validate_name(name: Option<&str>) -> Result<(), EngineError> {
    if name.is_some_and(|n| n.len() > MAX_NAME_LEN) {
        return Err(EngineError::LimitExceeded("resource name too long"));
    }
    Ok(())
}

/// Conflict check and insert under the owner-day lock of `resource.owner`.
async fn create_locked(
    catalog: Arc<dyn ResourceCatalog>,
    store: Arc<dyn ScheduleStore>,
    locks: OwnerDayLocks,
    resource: Resource,
    request: ScheduleRequest,
) -> Result<ScheduleEntry, ScheduleError> {
    let _guard = locks.lock(OwnerDay::new(&resource.owner, request.date)).await;

    // The flag may have flipped while this request waited for the lock.
    if catalog.find_active_resource(resource.id).await?.is_none() {
        return Err(ScheduleError::ResourceUnavailable(resource.id));
    }

    let check = ConflictDetector::new(store.as_ref())
        .check(&resource.owner, request.date, request.start, request.end)
        .await?;
    if let ConflictCheck::Conflict(existing) = check {
        return Err(ScheduleError::SchedulingConflict {
            owner: existing.owner,
            date: existing.date,
            start: existing.start,
            end: existing.end,
            conflicting_id: existing.id,
        });
    }

    let entry = store
        .insert(NewSchedule {
            resource_id: resource.id,
            owner: resource.owner,
            date: request.date,
            start: request.start,
            end: request.end,
        })
        .await?;
    Ok(entry)
}

async fn cancel_locked(
    store: Arc<dyn ScheduleStore>,
    locks: OwnerDayLocks,
    entry: ScheduleEntry,
    reason: Option<String>,
) -> Result<ScheduleEntry, StoreError> {
    let _guard = locks.lock(OwnerDay::new(&entry.owner, entry.date)).await;
    store.cancel(entry.id, reason).await
}

impl Engine {
    /// Validate, conflict-check and persist a new schedule entry.
    pub async fn create_schedule(
        &self,
        request: ScheduleRequest,
    ) -> Result<ScheduleEntry, ScheduleError> {
        let started = Instant::now();
        let result = self.try_create_schedule(&request).await;
        metrics::histogram!(SCHEDULE_CREATE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(entry) => {
                metrics::counter!(SCHEDULES_CREATED_TOTAL).increment(1);
                debug!(id = %entry.id, owner = %entry.owner, date = %entry.date, "schedule created");
            }
            Err(e) => {
                metrics::counter!(SCHEDULE_REJECTIONS_TOTAL, "code" => e.code()).increment(1);
                if let ScheduleError::StoreFailure(cause) = e {
                    error!(resource_id = %request.resource_id, "schedule create failed: {cause}");
                } else {
                    debug!(resource_id = %request.resource_id, code = e.code(), "schedule rejected: {e}");
                }
            }
        }
        result
    }

    async fn try_create_schedule(
        &self,
        request: &ScheduleRequest,
    ) -> Result<ScheduleEntry, ScheduleError> {
        if request.start >= request.end {
            return Err(ScheduleError::InvalidInterval {
                start: request.start,
                end: request.end,
            });
        }

        let resource = self
            .catalog
            .find_active_resource(request.resource_id)
            .await?
            .ok_or(ScheduleError::ResourceUnavailable(request.resource_id))?;

        // Detached so a caller that stops waiting cannot leave the owner-day
        // unlocked while an insert is still being applied.
        tokio::spawn(create_locked(
            self.catalog.clone(),
            self.store.clone(),
            self.locks.clone(),
            resource,
            request.clone(),
        ))
        .await
        .map_err(|e| ScheduleError::StoreFailure(StoreError::Aborted(e.to_string())))?
    }

    /// Tombstone an entry. The entry stays readable but never blocks again.
    pub async fn cancel_schedule(
        &self,
        id: Ulid,
        reason: Option<String>,
    ) -> Result<ScheduleEntry, EngineError> {
        if let Some(r) = &reason
            && r.len() > MAX_REASON_LEN
        {
            return Err(EngineError::LimitExceeded("cancellation reason too long"));
        }
        let entry = self.store.get(id).await?.ok_or(EngineError::NotFound(id))?;

        let cancelled = tokio::spawn(cancel_locked(
            self.store.clone(),
            self.locks.clone(),
            entry,
            reason,
        ))
        .await
        .unwrap_or_else(|e| Err(StoreError::Aborted(e.to_string())))
        .inspect_err(|e| {
            if matches!(e, StoreError::Wal(_) | StoreError::Aborted(_)) {
                error!(%id, "schedule cancel failed: {e}");
            }
        })?;

        metrics::counter!(SCHEDULES_CANCELLED_TOTAL).increment(1);
        debug!(%id, owner = %cancelled.owner, date = %cancelled.date, "schedule cancelled");
        Ok(cancelled)
    }

    pub async fn register_resource(&self, resource: Resource) -> Result<Resource, EngineError> {
        validate_owner(&resource.owner)?;
        validate_name(resource.name.as_deref())?;
        let registered = self.catalog.register_resource(resource).await?;
        info!(id = %registered.id, owner = %registered.owner, active = registered.active, "resource registered");
        Ok(registered)
    }

    /// Change a resource's owner, active flag or name.
    ///
    /// Existing entries keep the owner they were created under; only new
    /// requests see the change.
    pub async fn update_resource(
        &self,
        id: Ulid,
        update: ResourceUpdate,
    ) -> Result<Resource, EngineError> {
        if let Some(owner) = &update.owner {
            validate_owner(owner)?;
        }
        validate_name(update.name.as_deref())?;
        let updated = self.catalog.update_resource(id, update).await?;
        info!(%id, owner = %updated.owner, active = updated.active, "resource updated");
        Ok(updated)
    }
}
