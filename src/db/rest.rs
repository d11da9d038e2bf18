//! PostgREST-backed implementation of the store traits.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::auth::SessionHandle;
use crate::config::BackendConfig;
use crate::db::{
    CaseData, CaseRecord, CaseStore, EventData, EventRecord, EventStore, PersonData, PersonRecord,
    PersonStore, ProfileRecord, ProfileStore, UpdateProfileParams, UserSummary,
};
use crate::error::DatabaseError;
use crate::http::{authorize, backend_message, build_client};

const PEOPLE: &str = "people";
const CASES: &str = "cases";
const EVENTS: &str = "events";
const PROFILES: &str = "profiles";

#[derive(Serialize)]
struct NewRow<'a, T: Serialize> {
    user_id: Uuid,
    #[serde(flatten)]
    data: &'a T,
}

fn map_reqwest_error(e: reqwest::Error) -> DatabaseError {
    DatabaseError::Transport(e.to_string())
}

/// Table client for `{url}/rest/v1`.
pub struct RestBackend {
    http: Client,
    config: Arc<BackendConfig>,
    session: SessionHandle,
}

impl RestBackend {
    pub fn new(config: Arc<BackendConfig>, session: SessionHandle) -> Result<Self, DatabaseError> {
        let http = build_client(&config).map_err(map_reqwest_error)?;
        Ok(Self {
            http,
            config,
            session,
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let url = self.config.endpoint(&format!("rest/v1/{table}"));
        authorize(
            self.http.request(method, url),
            &self.config.anon_key,
            &self.session,
        )
    }

    async fn check(response: Response) -> Result<Response, DatabaseError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DatabaseError::Backend {
            status: status.as_u16(),
            message: backend_message(&body),
        })
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, DatabaseError> {
        let response = self
            .request(Method::GET, table)
            .query(query)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = Self::check(response).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| DatabaseError::Serialization(format!("{table}: {e}")))
    }

    async fn insert<T: Serialize + Sync>(
        &self,
        table: &str,
        owner: Uuid,
        data: &T,
    ) -> Result<(), DatabaseError> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(&NewRow {
                user_id: owner,
                data,
            })
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::check(response).await?;
        tracing::debug!(table, %owner, "Inserted row");
        Ok(())
    }

    async fn patch<T: Serialize + Sync + ?Sized>(
        &self,
        table: &str,
        id: Uuid,
        body: &T,
    ) -> Result<(), DatabaseError> {
        let response = self
            .request(Method::PATCH, table)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::check(response).await?;
        tracing::debug!(table, %id, "Updated row");
        Ok(())
    }

    async fn delete_row(&self, table: &str, id: Uuid) -> Result<(), DatabaseError> {
        let response = self
            .request(Method::DELETE, table)
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::check(response).await?;
        tracing::debug!(table, %id, "Deleted row");
        Ok(())
    }
}

fn newest_first() -> (&'static str, String) {
    ("order", "created_at.desc".to_string())
}

#[async_trait]
impl PersonStore for RestBackend {
    async fn list_people(&self) -> Result<Vec<PersonRecord>, DatabaseError> {
        self.select(PEOPLE, &[("select", "*".to_string()), newest_first()])
            .await
    }

    async fn insert_person(&self, owner: Uuid, data: &PersonData) -> Result<(), DatabaseError> {
        self.insert(PEOPLE, owner, data).await
    }

    async fn update_person(&self, id: Uuid, data: &PersonData) -> Result<(), DatabaseError> {
        self.patch(PEOPLE, id, data).await
    }

    async fn set_person_favorite(
        &self,
        id: Uuid,
        is_favorite: bool,
    ) -> Result<(), DatabaseError> {
        self.patch(PEOPLE, id, &json!({ "is_favorite": is_favorite }))
            .await
    }

    async fn delete_person(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.delete_row(PEOPLE, id).await
    }
}

#[async_trait]
impl CaseStore for RestBackend {
    async fn list_cases(&self) -> Result<Vec<CaseRecord>, DatabaseError> {
        self.select(CASES, &[("select", "*".to_string()), newest_first()])
            .await
    }

    async fn insert_case(&self, owner: Uuid, data: &CaseData) -> Result<(), DatabaseError> {
        self.insert(CASES, owner, data).await
    }

    async fn update_case(&self, id: Uuid, data: &CaseData) -> Result<(), DatabaseError> {
        self.patch(CASES, id, data).await
    }

    async fn delete_case(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.delete_row(CASES, id).await
    }
}

#[async_trait]
impl EventStore for RestBackend {
    async fn list_events_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<EventRecord>, DatabaseError> {
        // Repeated `date` keys combine as AND in PostgREST.
        self.select(
            EVENTS,
            &[
                ("select", "*".to_string()),
                ("date", format!("gte.{}", from.format("%Y-%m-%d"))),
                ("date", format!("lte.{}", to.format("%Y-%m-%d"))),
                ("order", "date.asc".to_string()),
            ],
        )
        .await
    }

    async fn insert_event(&self, owner: Uuid, data: &EventData) -> Result<(), DatabaseError> {
        self.insert(EVENTS, owner, data).await
    }

    async fn update_event(&self, id: Uuid, data: &EventData) -> Result<(), DatabaseError> {
        self.patch(EVENTS, id, data).await
    }

    async fn delete_event(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.delete_row(EVENTS, id).await
    }
}

#[async_trait]
impl ProfileStore for RestBackend {
    async fn get_profile(&self, id: Uuid) -> Result<Option<ProfileRecord>, DatabaseError> {
        let rows: Vec<ProfileRecord> = self
            .select(
                PROFILES,
                &[("select", "*".to_string()), ("id", format!("eq.{id}"))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_profiles(&self) -> Result<Vec<UserSummary>, DatabaseError> {
        self.select(PROFILES, &[("select", "id,username,email".to_string())])
            .await
    }

    async fn update_profile(
        &self,
        id: Uuid,
        input: &UpdateProfileParams,
    ) -> Result<(), DatabaseError> {
        self.patch(PROFILES, id, input).await
    }
}
