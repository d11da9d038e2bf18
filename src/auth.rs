//! Authentication against the hosted auth service, and the shared session.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::error::{AuthError, ValidationError};
use crate::http::{backend_message, build_client};

/// The signed-in account as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl AuthUser {
    /// Username stored in auth metadata at sign-up.
    pub fn metadata_username(&self) -> Option<&str> {
        self.user_metadata
            .get("username")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// The part of the email address before `@`.
    pub fn email_local_part(&self) -> Option<&str> {
        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug)]
pub struct Session {
    pub access_token: SecretString,
    pub user: AuthUser,
}

/// Broadcasts the current session to every interested component.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: Arc<watch::Sender<Option<Arc<Session>>>>,
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.tx.borrow().clone()
    }

    pub fn current_user_id(&self) -> Option<Uuid> {
        self.tx.borrow().as_ref().map(|s| s.user.id)
    }

    pub fn is_signed_in(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn set(&self, session: Option<Session>) {
        self.tx.send_replace(session.map(Arc::new));
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Session>>> {
        self.tx.subscribe()
    }
}

/// Registration input, checked before anything is sent.
#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub email: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegistrationForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.email.trim().is_empty() {
            return Err(ValidationError::Required { field: "email" });
        }
        if self.username.trim().is_empty() {
            return Err(ValidationError::Required { field: "username" });
        }
        if self.password.is_empty() {
            return Err(ValidationError::Required { field: "password" });
        }
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(())
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Create an account. The user confirms by email before signing in.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<(), AuthError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;
    async fn sign_out(&self, session: &Session) -> Result<(), AuthError>;
    /// Store `username` in the account metadata.
    async fn update_username(&self, session: &Session, username: &str) -> Result<(), AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

/// `AuthProvider` for the hosted `/auth/v1` endpoints.
pub struct RestAuth {
    http: Client,
    config: Arc<BackendConfig>,
}

fn map_reqwest_error(e: reqwest::Error) -> AuthError {
    AuthError::Transport(e.to_string())
}

impl RestAuth {
    pub fn new(config: Arc<BackendConfig>) -> Result<Self, AuthError> {
        let http = build_client(&config).map_err(map_reqwest_error)?;
        Ok(Self { http, config })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AuthError::Backend {
            status: status.as_u16(),
            message: backend_message(&body),
        })
    }
}

#[async_trait]
impl AuthProvider for RestAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<(), AuthError> {
        let response = self
            .http
            .post(self.config.endpoint("auth/v1/signup"))
            .header("apikey", self.config.anon_key.expose_secret())
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "username": username },
            }))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(self.config.endpoint("auth/v1/token"))
            .query(&[("grant_type", "password")])
            .header("apikey", self.config.anon_key.expose_secret())
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!("Sign-in rejected: {}", backend_message(&body));
                Err(AuthError::InvalidCredentials)
            }
            _ => {
                let response = Self::check(response).await?;
                let token: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
                tracing::info!(user_id = %token.user.id, "Signed in");
                Ok(Session {
                    access_token: SecretString::from(token.access_token),
                    user: token.user,
                })
            }
        }
    }

    async fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        let response = self
            .http
            .post(self.config.endpoint("auth/v1/logout"))
            .header("apikey", self.config.anon_key.expose_secret())
            .bearer_auth(session.access_token.expose_secret())
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn update_username(&self, session: &Session, username: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .put(self.config.endpoint("auth/v1/user"))
            .header("apikey", self.config.anon_key.expose_secret())
            .bearer_auth(session.access_token.expose_secret())
            .json(&json!({ "data": { "username": username } }))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use uuid::Uuid;

    use super::{AuthUser, RegistrationForm, Session, SessionHandle};
    use crate::error::ValidationError;

    fn user(email: Option<&str>, metadata: serde_json::Value) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: email.map(str::to_string),
            user_metadata: metadata,
        }
    }

    #[test]
    fn registration_rejects_mismatched_passwords() {
        let form = RegistrationForm {
            email: "a@firm.hk".to_string(),
            username: "amy".to_string(),
            password: "secret-1".to_string(),
            confirm_password: "secret-2".to_string(),
        };
        assert_eq!(form.validate(), Err(ValidationError::PasswordMismatch));
    }

    #[test]
    fn registration_requires_username() {
        let form = RegistrationForm {
            email: "a@firm.hk".to_string(),
            password: "pw".to_string(),
            confirm_password: "pw".to_string(),
            ..Default::default()
        };
        assert_eq!(
            form.validate(),
            Err(ValidationError::Required { field: "username" })
        );
    }

    #[test]
    fn username_fallbacks_read_metadata_then_email() {
        let with_meta = user(Some("amy@firm.hk"), json!({ "username": "Amy" }));
        assert_eq!(with_meta.metadata_username(), Some("Amy"));

        let without_meta = user(Some("amy@firm.hk"), json!({}));
        assert_eq!(without_meta.metadata_username(), None);
        assert_eq!(without_meta.email_local_part(), Some("amy"));
    }

    #[tokio::test]
    async fn session_handle_notifies_subscribers() {
        let handle = SessionHandle::new();
        let mut rx = handle.subscribe();
        assert!(!handle.is_signed_in());

        let signed_in = user(Some("amy@firm.hk"), json!({}));
        let id = signed_in.id;
        handle.set(Some(Session {
            access_token: SecretString::from("token".to_string()),
            user: signed_in,
        }));

        rx.changed().await.expect("sender alive");
        assert_eq!(rx.borrow().as_ref().map(|s| s.user.id), Some(id));
        assert_eq!(handle.current_user_id(), Some(id));

        handle.set(None);
        rx.changed().await.expect("sender alive");
        assert!(rx.borrow().is_none());
    }
}
