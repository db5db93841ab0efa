use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn get_schedule(&self, id: Ulid) -> Result<ScheduleEntry, EngineError> {
        self.store.get(id).await?.ok_or(EngineError::NotFound(id))
    }

    /// Everything booked for `owner` on `date`, tombstones included, in creation order.
    pub async fn list_schedules(
        &self,
        owner: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScheduleEntry>, EngineError> {
        Ok(self.store.list_by_owner_and_date(owner, date).await?)
    }

    pub async fn list_resource_schedules(
        &self,
        resource_id: Ulid,
    ) -> Result<Vec<ScheduleEntry>, EngineError> {
        Ok(self.store.list_by_resource(resource_id).await?)
    }

    pub async fn get_resource(&self, id: Ulid) -> Result<Resource, EngineError> {
        self.catalog
            .get_resource(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>, EngineError> {
        Ok(self.catalog.list_resources().await?)
    }
}
