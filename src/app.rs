//! Top-level application state.
//!
//! `App` owns the record services and the session. One background task
//! follows the session: signing in loads every list, signing out clears them.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::attachments::AttachmentManager;
use crate::auth::{AuthProvider, RegistrationForm, RestAuth, SessionHandle};
use crate::config::{CaseTypeRegistry, Config};
use crate::db::rest::RestBackend;
use crate::db::{CaseRecord, Database, EventRecord, PersonRecord, UserSummary};
use crate::directory::{CaseView, Directory, PersonView};
use crate::error::{AuthError, Error, ValidationError};
use crate::i18n::{Language, t, t_with};
use crate::prompt::{Confirm, Notifier};
use crate::records::{CaseService, EventService, PeopleService, ProfileService, ServiceContext};
use crate::reminders::Reminders;
use crate::storage::ObjectStorage;
use crate::storage::rest::RestStorage;

/// Collaborators an `App` is assembled from.
pub struct AppParts {
    pub db: Arc<dyn Database>,
    pub storage: Arc<dyn ObjectStorage>,
    pub auth: Arc<dyn AuthProvider>,
    pub session: SessionHandle,
    pub notifier: Arc<dyn Notifier>,
    pub confirm: Arc<dyn Confirm>,
    pub language: Language,
    pub case_types: Arc<CaseTypeRegistry>,
}

/// Owned copy of every loaded list, for building views.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub people: Vec<PersonRecord>,
    pub cases: Vec<CaseRecord>,
    pub events: Vec<EventRecord>,
    pub users: Vec<UserSummary>,
    pub language: Language,
}

impl Snapshot {
    pub fn directory(&self) -> Directory<'_> {
        Directory {
            people: &self.people,
            cases: &self.cases,
            users: &self.users,
            language: self.language,
        }
    }
}

#[derive(Clone)]
struct Services {
    notifier: Arc<dyn Notifier>,
    language: Language,
    people: Arc<PeopleService>,
    cases: Arc<CaseService>,
    events: Arc<EventService>,
    profile: Arc<ProfileService>,
}

impl Services {
    /// Fetch every list concurrently. Each failure is logged and alerted on
    /// its own; the rest still load.
    async fn load_all(&self) -> bool {
        let (people, cases, events, profile, users) = tokio::join!(
            self.people.refresh(),
            self.cases.refresh(),
            self.events.refresh(),
            self.profile.load(),
            self.profile.refresh_users(),
        );
        let failures: Vec<String> = [
            people.err().map(|e| e.to_string()),
            cases.err().map(|e| e.to_string()),
            events.err().map(|e| e.to_string()),
            profile.err().map(|e| e.to_string()),
            users.err().map(|e| e.to_string()),
        ]
        .into_iter()
        .flatten()
        .collect();

        for message in &failures {
            tracing::error!("Failed to load data: {}", message);
            self.notifier.alert(&t_with(
                self.language,
                "error_loading_data",
                &[("message", message)],
            ));
        }
        failures.is_empty()
    }

    async fn clear_all(&self) {
        tokio::join!(
            self.people.clear(),
            self.cases.clear(),
            self.events.clear(),
            self.profile.clear(),
        );
    }
}

pub struct App {
    auth: Arc<dyn AuthProvider>,
    session: SessionHandle,
    case_types: Arc<CaseTypeRegistry>,
    attachments: Arc<AttachmentManager>,
    services: Services,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl App {
    /// Wire the REST clients described by `config`.
    pub fn from_config(
        config: Config,
        notifier: Arc<dyn Notifier>,
        confirm: Arc<dyn Confirm>,
    ) -> Result<Self, Error> {
        let backend = Arc::new(config.backend);
        let session = SessionHandle::new();
        let db = Arc::new(RestBackend::new(backend.clone(), session.clone())?);
        let storage = Arc::new(RestStorage::new(backend.clone(), session.clone())?);
        let auth = Arc::new(RestAuth::new(backend)?);
        Ok(Self::with_parts(AppParts {
            db,
            storage,
            auth,
            session,
            notifier,
            confirm,
            language: config.language,
            case_types: config.case_types,
        }))
    }

    pub fn with_parts(parts: AppParts) -> Self {
        let attachments = Arc::new(AttachmentManager::new(
            parts.storage,
            parts.notifier.clone(),
            parts.language,
        ));
        let ctx = Arc::new(ServiceContext {
            db: parts.db,
            attachments: attachments.clone(),
            session: parts.session.clone(),
            notifier: parts.notifier.clone(),
            confirm: parts.confirm,
            language: parts.language,
        });
        let services = Services {
            notifier: parts.notifier,
            language: parts.language,
            people: Arc::new(PeopleService::new(ctx.clone())),
            cases: Arc::new(CaseService::new(ctx.clone())),
            events: Arc::new(EventService::new(ctx.clone())),
            profile: Arc::new(ProfileService::new(ctx, parts.auth.clone())),
        };
        Self {
            auth: parts.auth,
            session: parts.session,
            case_types: parts.case_types,
            attachments,
            services,
            listener: Mutex::new(None),
        }
    }

    pub fn language(&self) -> Language {
        self.services.language
    }

    pub fn case_types(&self) -> &Arc<CaseTypeRegistry> {
        &self.case_types
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn attachments(&self) -> &Arc<AttachmentManager> {
        &self.attachments
    }

    pub fn people(&self) -> &Arc<PeopleService> {
        &self.services.people
    }

    pub fn cases(&self) -> &Arc<CaseService> {
        &self.services.cases
    }

    pub fn events(&self) -> &Arc<EventService> {
        &self.services.events
    }

    pub fn profile(&self) -> &Arc<ProfileService> {
        &self.services.profile
    }

    fn alert(&self, key: &str) {
        self.services.notifier.alert(&t(self.language(), key));
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        match self.auth.sign_in(email.trim(), password).await {
            Ok(session) => {
                self.session.set(Some(session));
                Ok(())
            }
            Err(AuthError::InvalidCredentials) => {
                self.alert("error_invalid_credentials");
                Err(AuthError::InvalidCredentials)
            }
            Err(e) => {
                tracing::error!("Sign-in failed: {}", e);
                self.services.notifier.alert(&e.to_string());
                Err(e)
            }
        }
    }

    /// Create an account. Nothing is sent when the form does not validate.
    pub async fn register(&self, form: &RegistrationForm) -> Result<(), Error> {
        if let Err(e) = form.validate() {
            if e == ValidationError::PasswordMismatch {
                self.alert("passwords_do_not_match");
            }
            return Err(e.into());
        }
        if let Err(e) = self
            .auth
            .sign_up(form.email.trim(), &form.password, form.username.trim())
            .await
        {
            tracing::error!("Registration failed: {}", e);
            self.services.notifier.alert(&e.to_string());
            return Err(e.into());
        }
        tracing::info!("Registered new account");
        self.alert("register_success_confirm_email");
        Ok(())
    }

    /// End the session locally even when the backend call fails.
    pub async fn sign_out(&self) {
        if let Some(session) = self.session.current()
            && let Err(e) = self.auth.sign_out(&session).await
        {
            tracing::warn!("Sign-out request failed: {}", e);
        }
        self.session.set(None);
    }

    /// Start following the session. Returns false when already started.
    pub fn start_session_listener(&self) -> bool {
        let mut listener = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if listener.is_some() {
            return false;
        }
        let mut rx = self.session.subscribe();
        let services = self.services.clone();
        *listener = Some(tokio::spawn(async move {
            loop {
                let signed_in = rx.borrow_and_update().is_some();
                if signed_in {
                    tracing::info!("Session started, loading data");
                    services.load_all().await;
                } else {
                    tracing::info!("No session, clearing cached data");
                    services.clear_all().await;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }));
        true
    }

    /// Fetch every list now. Returns false when any fetch failed.
    pub async fn load_all(&self) -> bool {
        self.services.load_all().await
    }

    pub async fn snapshot(&self) -> Snapshot {
        let (people, cases, events, users) = tokio::join!(
            self.services.people.list(),
            self.services.cases.list(),
            self.services.events.list(),
            self.services.profile.users(),
        );
        Snapshot {
            people,
            cases,
            events,
            users,
            language: self.language(),
        }
    }

    pub async fn case_view(&self, id: Uuid) -> Option<CaseView> {
        let snapshot = self.snapshot().await;
        let dir = snapshot.directory();
        dir.case(id)
            .map(|case| CaseView::build(case, &self.case_types, &dir))
    }

    pub async fn person_view(&self, id: Uuid) -> Option<PersonView> {
        let snapshot = self.snapshot().await;
        let dir = snapshot.directory();
        dir.person(id).map(|person| PersonView::build(person, &dir))
    }

    pub async fn reminders(&self, today: NaiveDate) -> Reminders {
        let snapshot = self.snapshot().await;
        Reminders::build(&snapshot.events, &snapshot.cases, &self.case_types, today)
    }
}

impl Drop for App {
    fn drop(&mut self) {
        let listener = self.listener.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = listener.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Local;
    use serde_json::json;

    use super::{App, AppParts};
    use crate::auth::{AuthUser, RegistrationForm, SessionHandle};
    use crate::config::CaseTypeRegistry;
    use crate::db::{EventData, Participant, PersonData, Visibility};
    use crate::error::{AuthError, Error, ValidationError};
    use crate::i18n::Language;
    use crate::testing::{
        FakeAuth, MemoryDatabase, MemoryStorage, RecordingNotifier, StaticConfirm, TEST_EMAIL,
        TEST_PASSWORD,
    };

    struct Fixture {
        app: App,
        db: Arc<MemoryDatabase>,
        auth: Arc<FakeAuth>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(MemoryDatabase::new());
        let auth = Arc::new(FakeAuth::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let app = App::with_parts(AppParts {
            db: db.clone(),
            storage: Arc::new(MemoryStorage::new()),
            auth: auth.clone(),
            session: SessionHandle::new(),
            notifier: notifier.clone(),
            confirm: Arc::new(StaticConfirm::new(true)),
            language: Language::En,
            case_types: Arc::new(CaseTypeRegistry::bundled().expect("bundled").clone()),
        });
        Fixture {
            app,
            db,
            auth,
            notifier,
        }
    }

    async fn eventually(mut check: impl AsyncFnMut() -> bool) {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn wrong_password_alerts_and_keeps_session_empty() {
        let f = fixture();
        let err = f.app.sign_in("nobody@firm.hk", "x").await.expect_err("rejected");
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(!f.app.session().is_signed_in());
        assert_eq!(
            f.notifier.messages(),
            vec!["Login failed. Please check your email and password."]
        );
    }

    #[tokio::test]
    async fn mismatched_passwords_never_reach_the_backend() {
        let f = fixture();
        let form = RegistrationForm {
            email: "new@firm.hk".to_string(),
            username: "new".to_string(),
            password: "one".to_string(),
            confirm_password: "two".to_string(),
        };
        let err = f.app.register(&form).await.expect_err("mismatch");
        assert!(matches!(
            err,
            Error::Validation(ValidationError::PasswordMismatch)
        ));
        assert!(!f.auth.has_account("new@firm.hk"));
        assert_eq!(
            f.notifier.messages(),
            vec!["Passwords do not match. Please try again."]
        );

        let form = RegistrationForm {
            confirm_password: "one".to_string(),
            ..form
        };
        f.app.register(&form).await.expect("registered");
        assert!(f.auth.has_account("new@firm.hk"));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn registration_logs_never_contain_the_email() {
        let f = fixture();
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let form = RegistrationForm {
            email: "private@firm.hk".to_string(),
            username: "private".to_string(),
            password: "secret".to_string(),
            confirm_password: "secret".to_string(),
        };
        f.app.register(&form).await.expect("registered");

        let output = String::from_utf8(logs.0.lock().expect("log buffer").clone()).expect("utf8");
        assert!(output.contains("Registered new account"), "missing log: {output}");
        assert!(!output.contains("private@firm.hk"), "email leaked: {output}");
    }

    #[tokio::test]
    async fn listener_loads_on_sign_in_and_clears_on_sign_out() {
        let f = fixture();
        let user_id = uuid::Uuid::new_v4();
        f.auth.with_account(
            TEST_PASSWORD,
            AuthUser {
                id: user_id,
                email: Some(TEST_EMAIL.to_string()),
                user_metadata: json!({ "username": "tester" }),
            },
        );
        f.db.seed_person(
            user_id,
            PersonData {
                name_en: "John Doe".to_string(),
                ..Default::default()
            },
        );
        f.db.seed_event(
            user_id,
            EventData {
                title: None,
                participants: vec![Participant {
                    person_id: None,
                    person_name: "Mr Wong".to_string(),
                }],
                date: Local::now().date_naive(),
                time: String::new(),
                location: String::new(),
                notes: String::new(),
                attendees: Vec::new(),
                case_id: None,
                visibility: Visibility::Private,
                shared_with: Vec::new(),
            },
        );

        assert!(f.app.start_session_listener());
        assert!(!f.app.start_session_listener(), "only one listener");

        f.app.sign_in(TEST_EMAIL, TEST_PASSWORD).await.expect("signed in");
        eventually(async || {
            f.app.people().list().await.len() == 1 && f.app.profile().current().await.is_some()
        })
        .await;
        assert_eq!(f.app.events().list().await.len(), 1);
        let profile = f.app.profile().current().await.expect("profile");
        assert_eq!(profile.username, "tester");

        f.app.sign_out().await;
        assert_eq!(f.auth.sign_out_count(), 1);
        eventually(async || f.app.people().list().await.is_empty()).await;
        assert!(f.app.profile().current().await.is_none());
        assert!(f.app.events().list().await.is_empty());
    }

    #[tokio::test]
    async fn views_resolve_from_loaded_lists() {
        let f = fixture();
        let user_id = uuid::Uuid::new_v4();
        f.auth.with_account(
            TEST_PASSWORD,
            AuthUser {
                id: user_id,
                email: Some(TEST_EMAIL.to_string()),
                user_metadata: json!({}),
            },
        );
        let person = f.db.seed_person(
            user_id,
            PersonData {
                name_en: "Mary Chan".to_string(),
                ..Default::default()
            },
        );
        f.app.sign_in(TEST_EMAIL, TEST_PASSWORD).await.expect("signed in");
        assert!(f.app.load_all().await);

        let view = f.app.person_view(person).await.expect("person view");
        assert_eq!(view.person.data.name_en, "Mary Chan");
        assert!(view.related.is_empty());
        assert!(f.app.case_view(person).await.is_none());
        assert!(f.app.reminders(Local::now().date_naive()).await.is_empty());
    }
}
