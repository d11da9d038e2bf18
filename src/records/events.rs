use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use uuid::Uuid;

use crate::db::{EventData, EventRecord};
use crate::error::{DatabaseError, RecordError};
use crate::i18n::t;
use crate::records::{InFlight, RecordCache, ServiceContext};

const ENTITY: &str = "event";

/// Days after today included in the fetched window.
pub const EVENT_WINDOW_DAYS: u64 = 7;

pub struct EventService {
    ctx: Arc<ServiceContext>,
    cache: RecordCache<EventRecord>,
    in_flight: InFlight,
}

impl EventService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self {
            ctx,
            cache: RecordCache::new(),
            in_flight: InFlight::default(),
        }
    }

    /// Cached events in the current window, earliest first.
    pub async fn list(&self) -> Vec<EventRecord> {
        self.cache.snapshot().await
    }

    pub async fn get(&self, id: Uuid) -> Option<EventRecord> {
        self.cache.find(|e| e.id == id).await
    }

    pub async fn refresh(&self) -> Result<(), DatabaseError> {
        self.refresh_from(Local::now().date_naive()).await
    }

    /// Fetch events dated `today ..= today + 7`.
    pub async fn refresh_from(&self, today: NaiveDate) -> Result<(), DatabaseError> {
        let until = today
            .checked_add_days(Days::new(EVENT_WINDOW_DAYS))
            .unwrap_or(today);
        let events = self.ctx.db.list_events_between(today, until).await?;
        tracing::debug!(count = events.len(), %today, %until, "Fetched events");
        self.cache.replace(events).await;
        Ok(())
    }

    pub(crate) async fn clear(&self) {
        self.cache.clear().await;
    }

    async fn refresh_or_alert(&self) {
        if let Err(e) = self.refresh().await {
            tracing::error!("Failed to re-fetch events: {}", e);
            self.ctx.alert("error_loading_data", &e.to_string());
        }
    }

    pub async fn add(&self, data: EventData) -> Result<(), RecordError> {
        let owner = self.ctx.owner()?;
        if let Err(e) = self.ctx.db.insert_event(owner, &data).await {
            tracing::error!("Failed to add event: {}", e);
            self.ctx.alert("error_saving_event", &e.to_string());
            return Err(e.into());
        }
        tracing::info!(date = %data.date, "Added event");
        self.refresh_or_alert().await;
        Ok(())
    }

    pub async fn update(&self, id: Uuid, updated: &EventData) -> Result<(), RecordError> {
        let _guard = self.in_flight.begin(ENTITY, id)?;
        if let Err(e) = self.ctx.db.update_event(id, updated).await {
            tracing::error!(%id, "Failed to update event: {}", e);
            self.ctx.alert("error_updating_event", &e.to_string());
            return Err(e.into());
        }
        self.refresh_or_alert().await;
        Ok(())
    }

    /// Returns `false` when the user declines the confirmation.
    pub async fn delete(&self, id: Uuid) -> Result<bool, RecordError> {
        if !self.ctx.confirm("confirm_delete_event").await {
            return Ok(false);
        }
        let _guard = self.in_flight.begin(ENTITY, id)?;
        if let Err(e) = self.ctx.db.delete_event(id).await {
            tracing::error!(%id, "Failed to delete event: {}", e);
            self.ctx.alert("error_deleting_event", &e.to_string());
            return Err(e.into());
        }
        self.ctx
            .notifier
            .alert(&t(self.ctx.language, "event_deleted_successfully"));
        self.refresh_or_alert().await;
        Ok(true)
    }
}
