//! Attachment lifecycle: upload, selection, removal and archive download.
//!
//! An attachment is owned by exactly one person or case. Its bytes live in
//! object storage under `{owner}/{millis}_{filename}`; the record keeps the
//! public URL. Removal from storage always goes through
//! `crate::storage::storage_path_from_url`.

pub mod actions;
pub mod archive;

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{Local, Utc};
use futures::future::join_all;
use uuid::Uuid;

use crate::db::Attachment;
use crate::error::StorageError;
use crate::i18n::{Language, t_with};
use crate::prompt::Notifier;
use crate::storage::{ObjectStorage, object_path, storage_path_from_url};

/// A local file waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub name: String,
    pub contents: Bytes,
    pub content_type: String,
}

impl StagedFile {
    pub fn new(name: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        let name = name.into();
        let content_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            name,
            contents: contents.into(),
            content_type,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, StorageError> {
        let contents = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self::new(name, contents))
    }
}

/// Result of a batch upload. Failed files never appear in `uploaded`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub uploaded: Vec<Attachment>,
    pub failed: Vec<String>,
}

impl StageOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Remove every attachment whose id is in `ids`. Absent ids are ignored.
pub fn remove_by_ids(list: &mut Vec<Attachment>, ids: &[String]) -> Vec<Attachment> {
    let mut removed = Vec::new();
    list.retain(|attachment| {
        if ids.contains(&attachment.id) {
            removed.push(attachment.clone());
            false
        } else {
            true
        }
    });
    removed
}

/// Tracks which files were already saved on the record when editing began.
///
/// Removing a saved file only drops it from the draft: storage is cleaned up
/// by the update diff once the record is saved. Removing a file uploaded
/// during this edit deletes it from storage right away, since no saved record
/// refers to it.
#[derive(Debug, Clone, Default)]
pub struct AttachmentEdit {
    saved_urls: HashSet<String>,
}

impl AttachmentEdit {
    pub fn new(saved: &[Attachment]) -> Self {
        Self {
            saved_urls: saved.iter().filter_map(|a| a.url.clone()).collect(),
        }
    }

    /// Remove `ids` from `list`; returns URLs that must be deleted now.
    pub fn remove(&self, list: &mut Vec<Attachment>, ids: &[String]) -> Vec<String> {
        remove_by_ids(list, ids)
            .into_iter()
            .filter(|a| a.is_remote())
            .filter_map(|a| a.url)
            .filter(|url| !self.saved_urls.contains(url))
            .collect()
    }
}

/// Multi-select state over an attachment list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentSelection {
    ids: BTreeSet<String>,
}

impl AttachmentSelection {
    pub fn toggle(&mut self, id: &str) {
        if !self.ids.remove(id) {
            self.ids.insert(id.to_string());
        }
    }

    /// Select everything, or clear when everything is already selected.
    pub fn toggle_all(&mut self, list: &[Attachment]) {
        if !list.is_empty() && list.iter().all(|a| self.ids.contains(&a.id)) {
            self.clear();
        } else {
            self.ids = list.iter().map(|a| a.id.clone()).collect();
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    /// Selected entries in list order.
    pub fn selected<'a>(&self, list: &'a [Attachment]) -> Vec<&'a Attachment> {
        list.iter().filter(|a| self.ids.contains(&a.id)).collect()
    }

    /// Forget ids no longer present in `list`.
    pub fn retain_existing(&mut self, list: &[Attachment]) {
        self.ids.retain(|id| list.iter().any(|a| &a.id == id));
    }
}

/// Talks to object storage on behalf of forms and record services.
pub struct AttachmentManager {
    storage: Arc<dyn ObjectStorage>,
    notifier: Arc<dyn Notifier>,
    language: Language,
}

impl AttachmentManager {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn Notifier>,
        language: Language,
    ) -> Self {
        Self {
            storage,
            notifier,
            language,
        }
    }

    pub fn bucket(&self) -> &str {
        self.storage.bucket()
    }

    /// Upload `files` concurrently under `owner`. Failed files are dropped
    /// and reported once; nothing is retried.
    pub async fn stage_files(&self, owner: Uuid, files: Vec<StagedFile>) -> StageOutcome {
        let outcome = self.upload_files(owner, files).await;
        if outcome.is_partial() {
            self.notifier.alert(&t_with(
                self.language,
                "error_upload_partial",
                &[("message", &outcome.failed.join(", "))],
            ));
        }
        outcome
    }

    /// Like `stage_files`, but failures are only logged.
    ///
    /// Each file in the batch gets its own millisecond stamp, so files with
    /// the same name never share an object path or id.
    pub async fn upload_files(&self, owner: Uuid, files: Vec<StagedFile>) -> StageOutcome {
        let base = Utc::now().timestamp_millis();
        let uploads = files.into_iter().zip(base..).map(|(file, millis)| async move {
            let path = object_path(owner, millis, &file.name);
            match self
                .storage
                .upload(&path, file.contents, &file.content_type)
                .await
            {
                Ok(()) => Ok(Attachment {
                    id: format!("{millis}-{}", file.name),
                    url: Some(self.storage.public_url(&path)),
                    uploaded_at: Some(Local::now().date_naive().format("%Y-%m-%d").to_string()),
                    name: file.name,
                }),
                Err(e) => {
                    tracing::error!(file = %file.name, "Upload failed: {}", e);
                    Err(file.name)
                }
            }
        });

        let mut outcome = StageOutcome::default();
        for result in join_all(uploads).await {
            match result {
                Ok(attachment) => outcome.uploaded.push(attachment),
                Err(name) => outcome.failed.push(name),
            }
        }
        outcome
    }

    /// Object paths for `urls`; URLs that do not resolve are skipped.
    pub fn resolve_paths<'a>(&self, urls: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let bucket = self.storage.bucket();
        urls.into_iter()
            .filter_map(|url| {
                let path = storage_path_from_url(url, bucket);
                if path.is_none() {
                    tracing::warn!(url, "Could not resolve storage path, skipping");
                }
                path
            })
            .collect()
    }

    /// Delete the objects behind `urls` in one batch. Returns how many paths
    /// were sent; no request is made when none resolve.
    pub async fn delete_urls(&self, urls: &[String]) -> Result<usize, StorageError> {
        let paths = self.resolve_paths(urls.iter().map(String::as_str));
        if paths.is_empty() {
            return Ok(0);
        }
        self.storage.remove(&paths).await?;
        Ok(paths.len())
    }

    /// Best-effort delete used when a freshly uploaded file is removed from
    /// a draft. Failures are alerted; the draft is not rolled back.
    pub async fn discard_uploads(&self, urls: &[String]) {
        if urls.is_empty() {
            return;
        }
        if let Err(e) = self.delete_urls(urls).await {
            tracing::error!("Failed to delete discarded upload: {}", e);
            self.notifier.alert(&t_with(
                self.language,
                "error_deleting_file",
                &[("message", &e.to_string())],
            ));
        }
    }

    /// Download the selected attachments into `{dest_dir}/{context}.tar.gz`.
    ///
    /// Files that fail to download are alerted and left out. Returns `None`
    /// without writing anything when no file could be fetched.
    pub async fn download_archive(
        &self,
        attachments: &[Attachment],
        selection: &AttachmentSelection,
        context: &str,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, StorageError> {
        let fetches = selection
            .selected(attachments)
            .into_iter()
            .filter_map(|a| a.url.as_deref().map(|url| (a.name.clone(), url)))
            .map(|(name, url)| async move {
                let result = self.storage.download(url).await;
                (name, result)
            });

        let mut files = Vec::new();
        for (name, result) in join_all(fetches).await {
            match result {
                Ok(bytes) => files.push((name, bytes)),
                Err(e) => {
                    tracing::error!(file = %name, "Download failed: {}", e);
                    self.notifier.alert(&t_with(
                        self.language,
                        "error_downloading_file",
                        &[("message", &format!("{name}: {e}"))],
                    ));
                }
            }
        }
        if files.is_empty() {
            return Ok(None);
        }

        let packed = archive::build_tar_gz(&files)?;
        let path = dest_dir.join(archive::archive_file_name(context));
        tokio::fs::write(&path, packed).await?;
        tracing::info!(path = %path.display(), count = files.len(), "Wrote attachment archive");
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use uuid::Uuid;

    use super::{AttachmentEdit, AttachmentManager, AttachmentSelection, StagedFile, remove_by_ids};
    use crate::db::Attachment;
    use crate::i18n::Language;
    use crate::testing::{MemoryStorage, RecordingNotifier};

    fn manager() -> (AttachmentManager, Arc<MemoryStorage>, Arc<RecordingNotifier>) {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = AttachmentManager::new(storage.clone(), notifier.clone(), Language::En);
        (manager, storage, notifier)
    }

    fn attachment(id: &str, url: Option<&str>) -> Attachment {
        Attachment {
            id: id.to_string(),
            name: format!("{id}.pdf"),
            url: url.map(str::to_string),
            uploaded_at: None,
        }
    }

    #[test]
    fn staged_file_guesses_content_type() {
        assert_eq!(StagedFile::new("brief.pdf", Vec::new()).content_type, "application/pdf");
        assert_eq!(
            StagedFile::new("no-extension", Vec::new()).content_type,
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn stage_files_drops_failed_uploads_and_alerts_once() {
        let (manager, storage, notifier) = manager();
        storage.fail_uploads_of("broken.docx");
        let owner = Uuid::new_v4();

        let outcome = manager
            .stage_files(
                owner,
                vec![
                    StagedFile::new("brief.pdf", Bytes::from_static(b"a")),
                    StagedFile::new("broken.docx", Bytes::from_static(b"b")),
                    StagedFile::new("photo 1.jpg", Bytes::from_static(b"c")),
                ],
            )
            .await;

        assert_eq!(outcome.uploaded.len(), 2);
        assert_eq!(outcome.failed, vec!["broken.docx"]);
        assert!(outcome.uploaded.iter().all(|a| a.name != "broken.docx"));
        for uploaded in &outcome.uploaded {
            assert!(uploaded.id.ends_with(&format!("-{}", uploaded.name)));
            let path = manager
                .resolve_paths([uploaded.url.as_deref().expect("url")])
                .pop()
                .expect("resolvable url");
            assert!(path.starts_with(&owner.to_string()));
            assert!(storage.contains(&path), "missing object {path}");
        }
        let alerts = notifier.messages();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("broken.docx"));
    }

    #[tokio::test]
    async fn same_named_files_in_one_batch_get_distinct_paths() {
        let (manager, storage, notifier) = manager();
        let owner = Uuid::new_v4();

        let outcome = manager
            .stage_files(
                owner,
                vec![
                    StagedFile::new("scan.pdf", Bytes::from_static(b"page 1")),
                    StagedFile::new("scan.pdf", Bytes::from_static(b"page 2")),
                ],
            )
            .await;

        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.uploaded.len(), 2);
        assert_ne!(outcome.uploaded[0].id, outcome.uploaded[1].id);
        let paths = manager.resolve_paths(
            outcome
                .uploaded
                .iter()
                .map(|a| a.url.as_deref().expect("url")),
        );
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);
        assert!(paths.iter().all(|p| storage.contains(p)));
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn removing_absent_id_is_a_no_op() {
        let mut list = vec![attachment("a", None)];
        let removed = remove_by_ids(&mut list, &["zzz".to_string()]);
        assert!(removed.is_empty());
        assert_eq!(list.len(), 1);

        remove_by_ids(&mut list, &["a".to_string()]);
        let again = remove_by_ids(&mut list, &["a".to_string()]);
        assert!(again.is_empty());
        assert!(list.is_empty());
    }

    #[test]
    fn edit_session_defers_deletes_of_saved_files() {
        let saved_url = "https://test.supabase.co/storage/v1/object/public/attachments/u/1_saved.pdf";
        let fresh_url = "https://test.supabase.co/storage/v1/object/public/attachments/u/2_fresh.pdf";
        let saved = vec![attachment("saved", Some(saved_url))];
        let edit = AttachmentEdit::new(&saved);

        let mut draft = saved.clone();
        draft.push(attachment("fresh", Some(fresh_url)));

        let now = edit.remove(&mut draft, &["saved".to_string(), "fresh".to_string()]);
        assert_eq!(now, vec![fresh_url.to_string()]);
        assert!(draft.is_empty());
    }

    #[tokio::test]
    async fn delete_urls_sends_one_batch_and_skips_unresolvable() {
        let (manager, storage, _) = manager();
        let urls = vec![
            "https://test.supabase.co/storage/v1/object/public/attachments/u/1_a.pdf".to_string(),
            "https://elsewhere.example.com/a.pdf".to_string(),
            "https://test.supabase.co/storage/v1/object/public/attachments/u/2_b.pdf".to_string(),
        ];
        let sent = manager.delete_urls(&urls).await.expect("delete");
        assert_eq!(sent, 2);
        assert_eq!(
            storage.delete_batches(),
            vec![vec!["u/1_a.pdf".to_string(), "u/2_b.pdf".to_string()]]
        );

        let none = manager
            .delete_urls(&["https://elsewhere.example.com/x".to_string()])
            .await
            .expect("delete");
        assert_eq!(none, 0);
        assert_eq!(storage.delete_batches().len(), 1);
    }

    #[tokio::test]
    async fn discard_uploads_alerts_on_failure() {
        let (manager, storage, notifier) = manager();
        storage.fail_removes(true);
        manager
            .discard_uploads(&[
                "https://test.supabase.co/storage/v1/object/public/attachments/u/1_a.pdf"
                    .to_string(),
            ])
            .await;
        assert_eq!(notifier.messages().len(), 1);
    }

    #[test]
    fn selection_toggles_and_selects_all() {
        let list = vec![attachment("a", None), attachment("b", None)];
        let mut selection = AttachmentSelection::default();

        selection.toggle("a");
        assert!(selection.is_selected("a"));
        selection.toggle("a");
        assert!(selection.is_empty());

        selection.toggle_all(&list);
        assert_eq!(selection.len(), 2);
        selection.toggle_all(&list);
        assert!(selection.is_empty());

        selection.toggle("b");
        selection.toggle("gone");
        selection.retain_existing(&list);
        assert_eq!(selection.ids(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn archive_skips_failed_downloads() {
        let (manager, storage, notifier) = manager();
        let owner = Uuid::new_v4();
        let staged = manager
            .stage_files(
                owner,
                vec![
                    StagedFile::new("a.pdf", Bytes::from_static(b"first")),
                    StagedFile::new("b.pdf", Bytes::from_static(b"second")),
                ],
            )
            .await;
        let broken_url = staged.uploaded[1].url.clone().expect("url");
        storage.fail_downloads_of(&broken_url);

        let mut selection = AttachmentSelection::default();
        selection.toggle_all(&staged.uploaded);
        let dir = tempfile::tempdir().expect("tempdir");

        let path = manager
            .download_archive(&staged.uploaded, &selection, "LIT/001", dir.path())
            .await
            .expect("archive")
            .expect("one file succeeded");
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("LIT-001.tar.gz"));
        assert!(path.exists());
        assert_eq!(notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn archive_with_no_successes_writes_nothing() {
        let (manager, storage, _) = manager();
        let url = "https://test.supabase.co/storage/v1/object/public/attachments/u/1_a.pdf";
        storage.fail_downloads_of(url);
        let list = vec![attachment("a", Some(url))];
        let mut selection = AttachmentSelection::default();
        selection.toggle("a");
        let dir = tempfile::tempdir().expect("tempdir");

        let written = manager
            .download_archive(&list, &selection, "", dir.path())
            .await
            .expect("no error");
        assert!(written.is_none());
        assert!(!dir.path().join("attachments.tar.gz").exists());
    }
}
