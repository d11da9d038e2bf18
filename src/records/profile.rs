use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::db::{SharingGroup, UpdateProfileParams, UserSummary};
use crate::error::{AuthError, DatabaseError, Error, RecordError, ValidationError};
use crate::records::ServiceContext;

/// The signed-in user's profile with fallbacks applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentProfile {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub sharing_groups: Vec<SharingGroup>,
}

/// Build a new sharing group. Needs a name and at least one member.
pub fn new_sharing_group(
    name: &str,
    members: Vec<Uuid>,
) -> Result<SharingGroup, ValidationError> {
    let name = name.trim();
    if name.is_empty() || members.is_empty() {
        return Err(ValidationError::IncompleteSharingGroup);
    }
    Ok(SharingGroup {
        id: format!("sg-{}", Utc::now().timestamp_millis()),
        name: name.to_string(),
        members,
    })
}

pub struct ProfileService {
    ctx: Arc<ServiceContext>,
    auth: Arc<dyn AuthProvider>,
    current: RwLock<Option<CurrentProfile>>,
    users: RwLock<Vec<UserSummary>>,
}

impl ProfileService {
    pub fn new(ctx: Arc<ServiceContext>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            ctx,
            auth,
            current: RwLock::new(None),
            users: RwLock::new(Vec::new()),
        }
    }

    pub async fn current(&self) -> Option<CurrentProfile> {
        self.current.read().await.clone()
    }

    /// Every user, for sharing pickers and name lookups.
    pub async fn users(&self) -> Vec<UserSummary> {
        self.users.read().await.clone()
    }

    /// Load the signed-in user's profile.
    ///
    /// Username precedence: the profile row, then auth metadata, then the
    /// local part of the email address.
    pub async fn load(&self) -> Result<CurrentProfile, RecordError> {
        let session = self.ctx.session.current().ok_or(RecordError::NotSignedIn)?;
        let user = &session.user;
        let row = self.ctx.db.get_profile(user.id).await?;

        let stored_username = row
            .as_ref()
            .and_then(|r| r.username.as_deref())
            .filter(|u| !u.trim().is_empty());
        let username = stored_username
            .or_else(|| user.metadata_username())
            .or_else(|| user.email_local_part())
            .unwrap_or_default()
            .to_string();

        let profile = CurrentProfile {
            id: user.id,
            username,
            email: user
                .email
                .clone()
                .or_else(|| row.as_ref().and_then(|r| r.email.clone())),
            sharing_groups: row.map(|r| r.sharing_groups).unwrap_or_default(),
        };
        *self.current.write().await = Some(profile.clone());
        Ok(profile)
    }

    pub async fn refresh_users(&self) -> Result<(), DatabaseError> {
        let users = self.ctx.db.list_profiles().await?;
        tracing::debug!(count = users.len(), "Fetched users");
        *self.users.write().await = users;
        Ok(())
    }

    /// Save username and sharing groups: the auth account first, then the
    /// profile row. Stops at the first failure.
    pub async fn save(
        &self,
        username: &str,
        sharing_groups: Vec<SharingGroup>,
    ) -> Result<(), Error> {
        let session = self.ctx.session.current().ok_or(AuthError::NotSignedIn)?;
        let username = username.trim();
        if username.is_empty() {
            return Err(ValidationError::Required { field: "username" }.into());
        }

        if let Err(e) = self.auth.update_username(&session, username).await {
            tracing::error!("Failed to update auth username: {}", e);
            self.ctx.alert("error_saving_profile", &e.to_string());
            return Err(e.into());
        }
        let params = UpdateProfileParams {
            username: username.to_string(),
            sharing_groups,
        };
        if let Err(e) = self.ctx.db.update_profile(session.user.id, &params).await {
            tracing::error!("Failed to update profile row: {}", e);
            self.ctx.alert("error_saving_profile", &e.to_string());
            return Err(e.into());
        }

        let mut current = self.current.write().await;
        if let Some(profile) = current.as_mut() {
            profile.username = params.username;
            profile.sharing_groups = params.sharing_groups;
        }
        tracing::info!("Saved profile");
        Ok(())
    }

    pub(crate) async fn clear(&self) {
        *self.current.write().await = None;
        self.users.write().await.clear();
    }
}
