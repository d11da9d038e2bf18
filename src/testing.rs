//! In-memory stand-ins for the backend, storage, auth and prompts.
//!
//! `TestHarness` wires them into the real record services so unit and
//! integration tests can drive whole flows without a network.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use secrecy::SecretString;
use serde_json::json;
use uuid::Uuid;

use crate::attachments::AttachmentManager;
use crate::auth::{AuthProvider, AuthUser, Session, SessionHandle};
use crate::db::{
    CaseData, CaseRecord, CaseStore, EventData, EventRecord, EventStore, PersonData, PersonRecord,
    PersonStore, ProfileRecord, ProfileStore, UpdateProfileParams, UserSummary,
};
use crate::error::{AuthError, DatabaseError, StorageError};
use crate::i18n::Language;
use crate::prompt::{Confirm, Notifier};
use crate::records::{CaseService, EventService, PeopleService, ProfileService, ServiceContext};
use crate::storage::{ObjectStorage, public_object_url, storage_path_from_url};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub const TEST_BASE_URL: &str = "https://test.supabase.co";
pub const TEST_BUCKET: &str = "attachments";

/// Object storage backed by a map of path to bytes.
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    failing_uploads: Mutex<HashSet<String>>,
    failing_downloads: Mutex<HashSet<String>>,
    fail_removes: AtomicBool,
    batches: Mutex<Vec<Vec<String>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            failing_uploads: Mutex::new(HashSet::new()),
            failing_downloads: Mutex::new(HashSet::new()),
            fail_removes: AtomicBool::new(false),
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Uploads of a file with this name fail.
    pub fn fail_uploads_of(&self, filename: &str) {
        lock(&self.failing_uploads).insert(filename.to_string());
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_downloads_of(&self, url: &str) {
        lock(&self.failing_downloads).insert(url.to_string());
    }

    /// Every successful remove call, in order.
    pub fn delete_batches(&self) -> Vec<Vec<String>> {
        lock(&self.batches).clone()
    }

    pub fn contains(&self, path: &str) -> bool {
        lock(&self.objects).contains_key(path)
    }

    pub fn put(&self, path: &str, body: impl Into<Bytes>) {
        lock(&self.objects).insert(path.to_string(), body.into());
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn bucket(&self) -> &str {
        TEST_BUCKET
    }

    fn public_url(&self, path: &str) -> String {
        public_object_url(TEST_BASE_URL, TEST_BUCKET, path)
    }

    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let failing = lock(&self.failing_uploads)
            .iter()
            .any(|name| path.ends_with(&format!("_{name}")));
        if failing {
            return Err(StorageError::Backend {
                status: 500,
                message: "upload rejected".to_string(),
            });
        }
        // Uploads never overwrite.
        if self.contains(path) {
            return Err(StorageError::Backend {
                status: 409,
                message: "The resource already exists".to_string(),
            });
        }
        self.put(path, body);
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                status: 500,
                message: "remove rejected".to_string(),
            });
        }
        let mut objects = lock(&self.objects);
        for path in paths {
            objects.remove(path);
        }
        lock(&self.batches).push(paths.to_vec());
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Bytes, StorageError> {
        if lock(&self.failing_downloads).contains(url) {
            return Err(StorageError::Fetch {
                url: url.to_string(),
                status: 500,
            });
        }
        storage_path_from_url(url, TEST_BUCKET)
            .and_then(|path| lock(&self.objects).get(&path).cloned())
            .ok_or_else(|| StorageError::Fetch {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Collects alerts instead of showing them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn alert(&self, message: &str) {
        lock(&self.messages).push(message.to_string());
    }
}

/// Answers every confirmation the same way.
#[derive(Debug)]
pub struct StaticConfirm {
    answer: AtomicBool,
    asked: Mutex<Vec<String>>,
}

impl StaticConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer: AtomicBool::new(answer),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, answer: bool) {
        self.answer.store(answer, Ordering::SeqCst);
    }

    /// Questions asked so far.
    pub fn asked(&self) -> Vec<String> {
        lock(&self.asked).clone()
    }
}

#[async_trait]
impl Confirm for StaticConfirm {
    async fn confirm(&self, message: &str) -> bool {
        lock(&self.asked).push(message.to_string());
        self.answer.load(Ordering::SeqCst)
    }
}

struct Account {
    password: String,
    user: AuthUser,
}

/// Auth provider with accounts kept in memory.
#[derive(Default)]
pub struct FakeAuth {
    accounts: Mutex<HashMap<String, Account>>,
    usernames: Mutex<Vec<String>>,
    fail_updates: AtomicBool,
    sign_outs: AtomicI64,
}

impl FakeAuth {
    pub fn with_account(&self, password: &str, user: AuthUser) {
        let email = user.email.clone().unwrap_or_default();
        lock(&self.accounts).insert(
            email,
            Account {
                password: password.to_string(),
                user,
            },
        );
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Usernames written through `update_username`, in order.
    pub fn usernames(&self) -> Vec<String> {
        lock(&self.usernames).clone()
    }

    pub fn sign_out_count(&self) -> i64 {
        self.sign_outs.load(Ordering::SeqCst)
    }

    pub fn has_account(&self, email: &str) -> bool {
        lock(&self.accounts).contains_key(email)
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<(), AuthError> {
        let mut accounts = lock(&self.accounts);
        if accounts.contains_key(email) {
            return Err(AuthError::Backend {
                status: 422,
                message: "User already registered".to_string(),
            });
        }
        accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: AuthUser {
                    id: Uuid::new_v4(),
                    email: Some(email.to_string()),
                    user_metadata: json!({ "username": username }),
                },
            },
        );
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let accounts = lock(&self.accounts);
        match accounts.get(email) {
            Some(account) if account.password == password => Ok(Session {
                access_token: SecretString::from(format!("token-{}", account.user.id)),
                user: account.user.clone(),
            }),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn sign_out(&self, _session: &Session) -> Result<(), AuthError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_username(&self, _session: &Session, username: &str) -> Result<(), AuthError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AuthError::Backend {
                status: 500,
                message: "update rejected".to_string(),
            });
        }
        lock(&self.usernames).push(username.to_string());
        Ok(())
    }
}

/// Rows kept in memory, ordered the way the hosted backend returns them.
pub struct MemoryDatabase {
    people: Mutex<Vec<PersonRecord>>,
    cases: Mutex<Vec<CaseRecord>>,
    events: Mutex<Vec<EventRecord>>,
    profiles: Mutex<Vec<ProfileRecord>>,
    fail_writes: AtomicBool,
    write_gate: tokio::sync::Mutex<()>,
    clock: AtomicI64,
    epoch: DateTime<Utc>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            people: Mutex::new(Vec::new()),
            cases: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            profiles: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
            write_gate: tokio::sync::Mutex::new(()),
            clock: AtomicI64::new(0),
            epoch: Utc::now(),
        }
    }

    /// Make every insert, update and delete fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Park every insert, update and delete until the guard is dropped.
    pub async fn hold_writes(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.write_gate.lock().await
    }

    /// Strictly increasing creation time, so "newest first" is stable.
    fn next_created_at(&self) -> DateTime<Utc> {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst);
        self.epoch + Duration::seconds(tick)
    }

    async fn check_write(&self) -> Result<(), DatabaseError> {
        drop(self.write_gate.lock().await);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Backend {
                status: 500,
                message: "write rejected".to_string(),
            });
        }
        Ok(())
    }

    pub fn seed_person(&self, owner: Uuid, data: PersonData) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.people).push(PersonRecord {
            id,
            created_at: self.next_created_at(),
            user_id: owner,
            data,
        });
        id
    }

    pub fn seed_case(&self, owner: Uuid, data: CaseData) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.cases).push(CaseRecord {
            id,
            created_at: self.next_created_at(),
            user_id: owner,
            data,
        });
        id
    }

    pub fn seed_event(&self, owner: Uuid, data: EventData) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.events).push(EventRecord {
            id,
            created_at: self.next_created_at(),
            user_id: owner,
            data,
        });
        id
    }

    pub fn seed_profile(&self, profile: ProfileRecord) {
        let mut profiles = lock(&self.profiles);
        profiles.retain(|p| p.id != profile.id);
        profiles.push(profile);
    }

    pub fn people(&self) -> Vec<PersonRecord> {
        lock(&self.people).clone()
    }

    pub fn cases(&self) -> Vec<CaseRecord> {
        lock(&self.cases).clone()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        lock(&self.events).clone()
    }

    pub fn profile(&self, id: Uuid) -> Option<ProfileRecord> {
        lock(&self.profiles).iter().find(|p| p.id == id).cloned()
    }
}

fn newest_first<T: Clone>(rows: &[T], created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut rows = rows.to_vec();
    rows.sort_by_key(|row| std::cmp::Reverse(created_at(row)));
    rows
}

#[async_trait]
impl PersonStore for MemoryDatabase {
    async fn list_people(&self) -> Result<Vec<PersonRecord>, DatabaseError> {
        Ok(newest_first(&lock(&self.people), |p| p.created_at))
    }

    async fn insert_person(&self, owner: Uuid, data: &PersonData) -> Result<(), DatabaseError> {
        self.check_write().await?;
        self.seed_person(owner, data.clone());
        Ok(())
    }

    async fn update_person(&self, id: Uuid, data: &PersonData) -> Result<(), DatabaseError> {
        self.check_write().await?;
        let mut people = lock(&self.people);
        let row = people
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(DatabaseError::NotFound { entity: "person", id })?;
        row.data = data.clone();
        Ok(())
    }

    async fn set_person_favorite(
        &self,
        id: Uuid,
        is_favorite: bool,
    ) -> Result<(), DatabaseError> {
        self.check_write().await?;
        let mut people = lock(&self.people);
        let row = people
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(DatabaseError::NotFound { entity: "person", id })?;
        row.data.is_favorite = is_favorite;
        Ok(())
    }

    async fn delete_person(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.check_write().await?;
        lock(&self.people).retain(|p| p.id != id);
        Ok(())
    }
}

#[async_trait]
impl CaseStore for MemoryDatabase {
    async fn list_cases(&self) -> Result<Vec<CaseRecord>, DatabaseError> {
        Ok(newest_first(&lock(&self.cases), |c| c.created_at))
    }

    async fn insert_case(&self, owner: Uuid, data: &CaseData) -> Result<(), DatabaseError> {
        self.check_write().await?;
        self.seed_case(owner, data.clone());
        Ok(())
    }

    async fn update_case(&self, id: Uuid, data: &CaseData) -> Result<(), DatabaseError> {
        self.check_write().await?;
        let mut cases = lock(&self.cases);
        let row = cases
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(DatabaseError::NotFound { entity: "case", id })?;
        row.data = data.clone();
        Ok(())
    }

    async fn delete_case(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.check_write().await?;
        lock(&self.cases).retain(|c| c.id != id);
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryDatabase {
    async fn list_events_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<EventRecord>, DatabaseError> {
        let mut events: Vec<EventRecord> = lock(&self.events)
            .iter()
            .filter(|e| e.data.date >= from && e.data.date <= to)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.data.date);
        Ok(events)
    }

    async fn insert_event(&self, owner: Uuid, data: &EventData) -> Result<(), DatabaseError> {
        self.check_write().await?;
        self.seed_event(owner, data.clone());
        Ok(())
    }

    async fn update_event(&self, id: Uuid, data: &EventData) -> Result<(), DatabaseError> {
        self.check_write().await?;
        let mut events = lock(&self.events);
        let row = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(DatabaseError::NotFound { entity: "event", id })?;
        row.data = data.clone();
        Ok(())
    }

    async fn delete_event(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.check_write().await?;
        lock(&self.events).retain(|e| e.id != id);
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryDatabase {
    async fn get_profile(&self, id: Uuid) -> Result<Option<ProfileRecord>, DatabaseError> {
        Ok(self.profile(id))
    }

    async fn list_profiles(&self) -> Result<Vec<UserSummary>, DatabaseError> {
        Ok(lock(&self.profiles)
            .iter()
            .map(|p| UserSummary {
                id: p.id,
                username: p.username.clone().unwrap_or_default(),
                email: p.email.clone(),
            })
            .collect())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        input: &UpdateProfileParams,
    ) -> Result<(), DatabaseError> {
        self.check_write().await?;
        let mut profiles = lock(&self.profiles);
        match profiles.iter_mut().find(|p| p.id == id) {
            Some(row) => {
                row.username = Some(input.username.clone());
                row.sharing_groups = input.sharing_groups.clone();
            }
            None => profiles.push(ProfileRecord {
                id,
                username: Some(input.username.clone()),
                email: None,
                sharing_groups: input.sharing_groups.clone(),
            }),
        }
        Ok(())
    }
}

pub const TEST_EMAIL: &str = "tester@firm.hk";
pub const TEST_PASSWORD: &str = "correct horse";

/// Record services wired to in-memory collaborators. Alerts are English.
pub struct TestHarness {
    pub db: Arc<MemoryDatabase>,
    pub storage: Arc<MemoryStorage>,
    pub notifier: Arc<RecordingNotifier>,
    pub confirm: Arc<StaticConfirm>,
    pub auth: Arc<FakeAuth>,
    pub session: SessionHandle,
    pub user_id: Uuid,
    pub ctx: Arc<ServiceContext>,
    pub people: Arc<PeopleService>,
    pub cases: Arc<CaseService>,
    pub events: Arc<EventService>,
    pub profile: Arc<ProfileService>,
}

impl TestHarness {
    pub fn signed_in() -> Self {
        Self::signed_in_with_metadata(json!({}))
    }

    /// Signed in as `TEST_EMAIL` with the given auth metadata.
    pub fn signed_in_with_metadata(metadata: serde_json::Value) -> Self {
        let harness = Self::signed_out();
        let user = AuthUser {
            id: harness.user_id,
            email: Some(TEST_EMAIL.to_string()),
            user_metadata: metadata,
        };
        harness.auth.with_account(TEST_PASSWORD, user.clone());
        harness.session.set(Some(Session {
            access_token: SecretString::from("test-token".to_string()),
            user,
        }));
        harness
    }

    /// No session. `user_id` is still allocated for seeding rows.
    pub fn signed_out() -> Self {
        let db = Arc::new(MemoryDatabase::new());
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let confirm = Arc::new(StaticConfirm::new(true));
        let auth = Arc::new(FakeAuth::default());
        let session = SessionHandle::new();
        let language = Language::En;

        let attachments = Arc::new(AttachmentManager::new(
            storage.clone(),
            notifier.clone(),
            language,
        ));
        let ctx = Arc::new(ServiceContext {
            db: db.clone(),
            attachments,
            session: session.clone(),
            notifier: notifier.clone(),
            confirm: confirm.clone(),
            language,
        });

        Self {
            people: Arc::new(PeopleService::new(ctx.clone())),
            cases: Arc::new(CaseService::new(ctx.clone())),
            events: Arc::new(EventService::new(ctx.clone())),
            profile: Arc::new(ProfileService::new(ctx.clone(), auth.clone())),
            db,
            storage,
            notifier,
            confirm,
            auth,
            session,
            user_id: Uuid::new_v4(),
            ctx,
        }
    }

    /// Decline every confirmation.
    pub fn declining(self) -> Self {
        self.confirm.set(false);
        self
    }
}
