use std::sync::Arc;

use uuid::Uuid;

use crate::db::{PersonData, PersonRecord};
use crate::error::{DatabaseError, RecordError};
use crate::records::{
    InFlight, RecordCache, ServiceContext, UpdateOutcome, purge_attachments, update_with_cleanup,
};

const ENTITY: &str = "person";

pub struct PeopleService {
    ctx: Arc<ServiceContext>,
    cache: RecordCache<PersonRecord>,
    in_flight: InFlight,
}

impl PeopleService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self {
            ctx,
            cache: RecordCache::new(),
            in_flight: InFlight::default(),
        }
    }

    /// Cached people, newest first.
    pub async fn list(&self) -> Vec<PersonRecord> {
        self.cache.snapshot().await
    }

    pub async fn get(&self, id: Uuid) -> Option<PersonRecord> {
        self.cache.find(|p| p.id == id).await
    }

    pub async fn refresh(&self) -> Result<(), DatabaseError> {
        let people = self.ctx.db.list_people().await?;
        tracing::debug!(count = people.len(), "Fetched people");
        self.cache.replace(people).await;
        Ok(())
    }

    pub(crate) async fn clear(&self) {
        self.cache.clear().await;
    }

    async fn refresh_or_alert(&self) {
        if let Err(e) = self.refresh().await {
            tracing::error!("Failed to re-fetch people: {}", e);
            self.ctx.alert("error_loading_data", &e.to_string());
        }
    }

    pub async fn add(&self, data: PersonData) -> Result<(), RecordError> {
        let owner = self.ctx.owner()?;
        if let Err(e) = self.ctx.db.insert_person(owner, &data).await {
            tracing::error!("Failed to add person: {}", e);
            self.ctx.alert("error_saving_record", &e.to_string());
            return Err(e.into());
        }
        tracing::info!(name = %data.display_name(), "Added person");
        self.refresh_or_alert().await;
        Ok(())
    }

    /// Replace everything but id, owner and creation time.
    pub async fn update(
        &self,
        original: &PersonRecord,
        updated: &PersonData,
    ) -> Result<UpdateOutcome, RecordError> {
        let _guard = self.in_flight.begin(ENTITY, original.id)?;
        let outcome = update_with_cleanup(
            &self.ctx,
            ENTITY,
            &original.data.attachments,
            &updated.attachments,
            self.ctx.db.update_person(original.id, updated),
        )
        .await;
        if outcome.record.is_ok() {
            self.refresh_or_alert().await;
        }
        Ok(outcome)
    }

    /// Returns `false` when the user declines the confirmation.
    pub async fn delete(&self, id: Uuid) -> Result<bool, RecordError> {
        if !self.ctx.confirm("confirm_delete_person").await {
            return Ok(false);
        }
        let person = self
            .get(id)
            .await
            .ok_or(RecordError::NotLoaded { entity: ENTITY, id })?;
        let _guard = self.in_flight.begin(ENTITY, id)?;

        purge_attachments(&self.ctx, ENTITY, &person.data.attachments).await?;
        if let Err(e) = self.ctx.db.delete_person(id).await {
            tracing::error!(%id, "Failed to delete person: {}", e);
            self.ctx.alert("error_deleting_record", &e.to_string());
            return Err(e.into());
        }
        tracing::info!(%id, "Deleted person");
        self.refresh_or_alert().await;
        Ok(true)
    }

    pub async fn toggle_favorite(&self, person: &PersonRecord) -> Result<(), RecordError> {
        let _guard = self.in_flight.begin(ENTITY, person.id)?;
        let next = !person.data.is_favorite;
        if let Err(e) = self.ctx.db.set_person_favorite(person.id, next).await {
            tracing::error!(id = %person.id, "Failed to toggle favourite: {}", e);
            self.ctx.alert("error_updating_record", &e.to_string());
            return Err(e.into());
        }
        self.refresh_or_alert().await;
        Ok(())
    }
}
