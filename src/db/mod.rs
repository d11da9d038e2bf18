//! Record types and the persistence abstraction.
//!
//! Rows live in a hosted PostgREST-style backend. The JSON field names below
//! match the existing `people`, `cases`, `events` and `profiles` tables, so
//! records written by earlier clients keep loading. Columns that are `null`
//! in legacy rows deserialize as empty values.
//!
//! The `Database` supertrait combines the per-entity stores. `rest` talks to
//! the real backend; `crate::testing::MemoryDatabase` keeps rows in memory.

pub mod rest;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Who can see a record besides its owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
    Custom,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
            Self::Custom => "custom",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "private" => Some(Self::Private),
            "public" => Some(Self::Public),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Case lifecycle state. The stored value doubles as the label key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseStatus {
    #[default]
    #[serde(rename = "status_ongoing")]
    Ongoing,
    #[serde(rename = "status_completed")]
    Completed,
    #[serde(rename = "status_on_hold")]
    OnHold,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 3] = [Self::Ongoing, Self::Completed, Self::OnHold];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ongoing => "status_ongoing",
            Self::Completed => "status_completed",
            Self::OnHold => "status_on_hold",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "status_ongoing" => Some(Self::Ongoing),
            "status_completed" => Some(Self::Completed),
            "status_on_hold" => Some(Self::OnHold),
            _ => None,
        }
    }
}

/// How a person relates to the practice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityType {
    #[default]
    #[serde(rename = "identity_client")]
    Client,
    #[serde(rename = "identity_collaborator")]
    Collaborator,
    #[serde(rename = "identity_other")]
    Other,
}

impl IdentityType {
    pub const ALL: [IdentityType; 3] = [Self::Client, Self::Collaborator, Self::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "identity_client",
            Self::Collaborator => "identity_collaborator",
            Self::Other => "identity_other",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "identity_client" => Some(Self::Client),
            "identity_collaborator" => Some(Self::Collaborator),
            "identity_other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "type", default)]
    pub kind: IdentityType,
    /// Free-text identity, only meaningful for `IdentityType::Other`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_value: String,
}

/// File metadata stored inline on a person or case.
///
/// `url` is absent only for files staged locally and not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "uploadedAt", default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
}

impl Attachment {
    /// Whether the file lives in remote storage.
    pub fn is_remote(&self) -> bool {
        self.url
            .as_deref()
            .is_some_and(|url| url.starts_with("http"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    #[serde(default, deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: String,
}

/// An event participant: a known person, or just a typed-in name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "personId", default, skip_serializing_if = "Option::is_none")]
    pub person_id: Option<Uuid>,
    #[serde(rename = "personName", default, deserialize_with = "null_as_default")]
    pub person_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingGroup {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub members: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonData {
    #[serde(deserialize_with = "null_as_default")]
    pub name_en: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name_zh: String,
    #[serde(deserialize_with = "null_as_default")]
    pub hkid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub nationality: String,
    #[serde(deserialize_with = "null_as_default")]
    pub phones: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub emails: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub identity: Identity,
    #[serde(deserialize_with = "null_as_default")]
    pub personality_notes: String,
    #[serde(deserialize_with = "null_as_default")]
    pub notes: String,
    #[serde(deserialize_with = "null_as_default")]
    pub attachments: Vec<Attachment>,
    #[serde(deserialize_with = "null_as_default")]
    pub visibility: Visibility,
    #[serde(deserialize_with = "null_as_default")]
    pub shared_with: Vec<Uuid>,
    #[serde(deserialize_with = "null_as_default")]
    pub custom_fields: Vec<CustomField>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_favorite: bool,
}

impl PersonData {
    /// English name, or the Chinese name when no English name is set.
    pub fn display_name(&self) -> &str {
        if self.name_en.is_empty() {
            &self.name_zh
        } else {
            &self.name_en
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub data: PersonData,
}

/// Role values were once stored as a single id; accept that, a list, or null.
fn role_members<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Members {
        Many(Vec<Uuid>),
        One(Uuid),
        Empty(()),
    }

    let raw: Option<BTreeMap<String, Members>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(role, members)| {
            let ids = match members {
                Members::Many(ids) => ids,
                Members::One(id) => vec![id],
                Members::Empty(()) => Vec::new(),
            };
            (role, ids)
        })
        .collect())
}

/// Field values are text inputs; tolerate nulls and stray numbers in old rows.
fn field_values<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseData {
    #[serde(deserialize_with = "null_as_default")]
    pub reference_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub case_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub case_subtype: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: CaseStatus,
    #[serde(deserialize_with = "role_members")]
    pub roles: BTreeMap<String, Vec<Uuid>>,
    #[serde(deserialize_with = "field_values")]
    pub fields: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub notes: String,
    #[serde(deserialize_with = "null_as_default")]
    pub attachments: Vec<Attachment>,
    #[serde(deserialize_with = "null_as_default")]
    pub visibility: Visibility,
    #[serde(deserialize_with = "null_as_default")]
    pub shared_with: Vec<Uuid>,
    #[serde(deserialize_with = "null_as_default")]
    pub custom_fields: Vec<CustomField>,
}

impl CaseData {
    /// Whether `person_id` fills any role on this case.
    pub fn involves(&self, person_id: Uuid) -> bool {
        self.roles.values().any(|ids| ids.contains(&person_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub data: CaseData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    /// Written as `null` when unset so an update clears a stored title.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub participants: Vec<Participant>,
    pub date: NaiveDate,
    /// `HH:MM`, or empty for an all-day event.
    #[serde(default, deserialize_with = "null_as_default")]
    pub time: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attendees: Vec<Uuid>,
    #[serde(default)]
    pub case_id: Option<Uuid>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub visibility: Visibility,
    #[serde(default, deserialize_with = "null_as_default")]
    pub shared_with: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub data: EventData,
}

/// A row of the `profiles` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: Uuid,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sharing_groups: Vec<SharingGroup>,
}

/// Minimal user listing used for sharing pickers and name lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateProfileParams {
    pub username: String,
    pub sharing_groups: Vec<SharingGroup>,
}

#[async_trait]
pub trait PersonStore: Send + Sync {
    /// All visible people, newest first.
    async fn list_people(&self) -> Result<Vec<PersonRecord>, DatabaseError>;
    async fn insert_person(&self, owner: Uuid, data: &PersonData) -> Result<(), DatabaseError>;
    async fn update_person(&self, id: Uuid, data: &PersonData) -> Result<(), DatabaseError>;
    async fn set_person_favorite(
        &self,
        id: Uuid,
        is_favorite: bool,
    ) -> Result<(), DatabaseError>;
    async fn delete_person(&self, id: Uuid) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait CaseStore: Send + Sync {
    /// All visible cases, newest first.
    async fn list_cases(&self) -> Result<Vec<CaseRecord>, DatabaseError>;
    async fn insert_case(&self, owner: Uuid, data: &CaseData) -> Result<(), DatabaseError>;
    async fn update_case(&self, id: Uuid, data: &CaseData) -> Result<(), DatabaseError>;
    async fn delete_case(&self, id: Uuid) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Events dated within `[from, to]`, earliest first.
    async fn list_events_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<EventRecord>, DatabaseError>;
    async fn insert_event(&self, owner: Uuid, data: &EventData) -> Result<(), DatabaseError>;
    async fn update_event(&self, id: Uuid, data: &EventData) -> Result<(), DatabaseError>;
    async fn delete_event(&self, id: Uuid) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> Result<Option<ProfileRecord>, DatabaseError>;
    async fn list_profiles(&self) -> Result<Vec<UserSummary>, DatabaseError>;
    async fn update_profile(
        &self,
        id: Uuid,
        input: &UpdateProfileParams,
    ) -> Result<(), DatabaseError>;
}

/// Combines all sub-traits into one. Consumers hold `Arc<dyn Database>`;
/// leaf code can depend on a single sub-trait instead.
pub trait Database: PersonStore + CaseStore + EventStore + ProfileStore + Send + Sync {}

impl<T> Database for T where T: PersonStore + CaseStore + EventStore + ProfileStore + Send + Sync {}
