//! CRUD orchestration for people, cases, events and the user profile.
//!
//! Every service keeps its list in a local cache, writes through the
//! `Database`, and re-fetches the whole list after a successful mutation.
//! Attachment cleanup is ordered differently per operation:
//!
//! - update: orphaned files are deleted *concurrently* with the row write and
//!   each failure is reported on its own;
//! - delete: files are purged *first*, and the row survives if that fails.

pub mod cases;
pub mod events;
pub mod people;
pub mod profile;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use uuid::Uuid;

pub use cases::CaseService;
pub use events::EventService;
pub use people::PeopleService;
pub use profile::{CurrentProfile, ProfileService};

use crate::attachments::AttachmentManager;
use crate::auth::SessionHandle;
use crate::db::{Attachment, Database};
use crate::error::{DatabaseError, RecordError, StorageError};
use crate::i18n::{Language, t, t_with};
use crate::prompt::{Confirm, Notifier};

/// Collaborators shared by all record services.
pub struct ServiceContext {
    pub db: Arc<dyn Database>,
    pub attachments: Arc<AttachmentManager>,
    pub session: SessionHandle,
    pub notifier: Arc<dyn Notifier>,
    pub confirm: Arc<dyn Confirm>,
    pub language: Language,
}

impl ServiceContext {
    pub(crate) fn owner(&self) -> Result<Uuid, RecordError> {
        self.session
            .current_user_id()
            .ok_or(RecordError::NotSignedIn)
    }

    pub(crate) fn alert(&self, key: &str, message: &str) {
        self.notifier
            .alert(&t_with(self.language, key, &[("message", message)]));
    }

    pub(crate) async fn confirm(&self, key: &str) -> bool {
        self.confirm.confirm(&t(self.language, key)).await
    }
}

/// Locally cached list, replaced wholesale on every fetch.
pub(crate) struct RecordCache<T> {
    rows: RwLock<Vec<T>>,
}

impl<T: Clone> RecordCache<T> {
    pub(crate) fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    pub(crate) async fn snapshot(&self) -> Vec<T> {
        self.rows.read().await.clone()
    }

    pub(crate) async fn replace(&self, rows: Vec<T>) {
        *self.rows.write().await = rows;
    }

    pub(crate) async fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.rows.read().await.iter().find(|row| pred(row)).cloned()
    }

    pub(crate) async fn clear(&self) {
        self.rows.write().await.clear();
    }
}

/// Record ids with a mutation in progress.
#[derive(Default)]
pub(crate) struct InFlight {
    ids: Mutex<HashSet<Uuid>>,
}

pub(crate) struct InFlightGuard<'a> {
    owner: &'a InFlight,
    id: Uuid,
}

impl InFlight {
    /// Claim `id`, or fail if another mutation of it is still running.
    pub(crate) fn begin(
        &self,
        entity: &'static str,
        id: Uuid,
    ) -> Result<InFlightGuard<'_>, RecordError> {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        if !ids.insert(id) {
            tracing::debug!(entity, %id, "Rejected overlapping mutation");
            return Err(RecordError::InFlight { entity });
        }
        Ok(InFlightGuard { owner: self, id })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut ids = self.owner.ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.remove(&self.id);
    }
}

/// Result of an update. The row write and the storage cleanup are reported
/// independently because they run concurrently.
#[derive(Debug)]
pub struct UpdateOutcome {
    pub record: Result<(), DatabaseError>,
    /// Number of storage paths deleted.
    pub cleanup: Result<usize, StorageError>,
}

impl UpdateOutcome {
    pub fn is_ok(&self) -> bool {
        self.record.is_ok() && self.cleanup.is_ok()
    }
}

/// URLs present on the saved record but missing from the update.
pub fn orphaned_urls(original: &[Attachment], updated: &[Attachment]) -> Vec<String> {
    let kept: HashSet<&str> = updated.iter().filter_map(|a| a.url.as_deref()).collect();
    original
        .iter()
        .filter_map(|a| a.url.as_deref())
        .filter(|url| !kept.contains(url))
        .map(str::to_string)
        .collect()
}

/// Write a record while deleting the files it no longer references.
pub(crate) async fn update_with_cleanup<F>(
    ctx: &ServiceContext,
    entity: &'static str,
    original: &[Attachment],
    updated: &[Attachment],
    write: F,
) -> UpdateOutcome
where
    F: Future<Output = Result<(), DatabaseError>>,
{
    let urls = orphaned_urls(original, updated);
    let cleanup = async {
        if urls.is_empty() {
            Ok(0)
        } else {
            ctx.attachments.delete_urls(&urls).await
        }
    };
    let (record, cleanup) = tokio::join!(write, cleanup);

    if let Err(e) = &cleanup {
        tracing::error!(entity, "Failed to delete orphaned attachments: {}", e);
        ctx.alert("error_deleting_attachments", &e.to_string());
    }
    if let Err(e) = &record {
        tracing::error!(entity, "Failed to update record: {}", e);
        ctx.alert("error_updating_record", &e.to_string());
    }
    UpdateOutcome { record, cleanup }
}

/// Delete every stored file of a record that is about to be removed.
pub(crate) async fn purge_attachments(
    ctx: &ServiceContext,
    entity: &'static str,
    attachments: &[Attachment],
) -> Result<usize, RecordError> {
    let urls: Vec<String> = attachments.iter().filter_map(|a| a.url.clone()).collect();
    match ctx.attachments.delete_urls(&urls).await {
        Ok(count) => Ok(count),
        Err(e) => {
            tracing::error!(entity, "Attachment purge failed, keeping record: {}", e);
            ctx.alert("error_deleting_attachments", &e.to_string());
            Err(RecordError::AttachmentPurge(e))
        }
    }
}
